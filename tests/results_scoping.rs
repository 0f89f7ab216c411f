mod test_support;

use serde_json::json;
use test_support::{seed_exports, temp_dir, Sidecar, SUPER_PASSWORD};

struct Fixture {
    sidecar: Sidecar,
    super_token: String,
    a1_token: String,
    b2_token: String,
}

fn fixture(prefix: &str) -> Fixture {
    let workspace = temp_dir(prefix);
    seed_exports(&workspace);
    let mut sidecar = Sidecar::spawn();
    sidecar.select_workspace(&workspace);
    let super_token = sidecar.login(SUPER_PASSWORD);

    let built = sidecar.request_ok("data.build", json!({ "token": super_token }));
    assert_eq!(built["schools"], 2);
    assert_eq!(built["report"]["students"], 4);

    let generated = sidecar.request_ok("auth.generate", json!({ "token": super_token }));
    let password_for = |cct: &str| {
        generated["schools"]
            .as_array()
            .expect("schools")
            .iter()
            .find(|s| s["cct"] == cct)
            .and_then(|s| s["password"].as_str())
            .expect("school password")
            .to_string()
    };
    let (a1_pw, b2_pw) = (password_for("A1"), password_for("B2"));
    let a1_token = sidecar.login(&a1_pw);
    let b2_token = sidecar.login(&b2_pw);
    Fixture {
        sidecar,
        super_token,
        a1_token,
        b2_token,
    }
}

#[test]
fn school_sessions_see_only_their_school() {
    let mut f = fixture("rafd-results-scope");

    let all = f
        .sidecar
        .request_ok("results.schools", json!({ "token": f.super_token }));
    let ccts: Vec<&str> = all["escuelas"]
        .as_array()
        .expect("escuelas")
        .iter()
        .filter_map(|s| s["cct"].as_str())
        .collect();
    assert_eq!(ccts, vec!["A1", "B2"]);

    let mine = f
        .sidecar
        .request_ok("results.schools", json!({ "token": f.a1_token }));
    let list = mine["escuelas"].as_array().expect("escuelas");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["cct"], "A1");
    assert_eq!(list[0]["grupos"], json!([{ "nombre": "1AM", "total": 2 }, { "nombre": "1AV", "total": 1 }]));

    assert_eq!(
        f.sidecar
            .request_err("results.school", json!({ "token": f.a1_token, "cct": "B2" })),
        "forbidden"
    );
    assert_eq!(
        f.sidecar.request_err(
            "results.group",
            json!({ "token": f.b2_token, "cct": "A1", "group": "1AM" })
        ),
        "forbidden"
    );
    assert_eq!(
        f.sidecar.request_err("results.schools", json!({})),
        "invalid_session"
    );
}

#[test]
fn school_and_group_statistics_come_from_students() {
    let mut f = fixture("rafd-results-stats");

    let school = f
        .sidecar
        .request_ok("results.school", json!({ "token": f.a1_token, "cct": "A1" }));
    assert_eq!(school["totalEstudiantes"], 3);
    assert_eq!(school["esperado"], 1);
    assert_eq!(school["requiereApoyo"], 2);
    assert_eq!(school["sinExamen"], 0);
    assert_eq!(school["porcentajesReactivos"][0], 66.7);
    assert_eq!(school["porcentajesReactivos"][1], 66.7);
    assert_eq!(school["porcentajesReactivos"][2], 0.0);
    assert_eq!(
        school["porcentajesReactivos"].as_array().map(|a| a.len()),
        Some(12)
    );

    // Legacy label resolves to the canonical group.
    let group = f.sidecar.request_ok(
        "results.group",
        json!({ "token": f.super_token, "cct": "A1", "group": "m1a" }),
    );
    assert_eq!(group["nombre"], "1AM");
    assert_eq!(group["cct"], "A1");
    assert_eq!(group["total"], 2);
    assert_eq!(group["porcentajesReactivos"][0], 50.0);
    assert_eq!(group["porcentajesReactivos"][1], 100.0);
    let alumnos = group["alumnos"].as_array().expect("alumnos");
    assert_eq!(alumnos[0]["respuestas"].as_array().map(|a| a.len()), Some(12));

    assert_eq!(
        f.sidecar.request_err(
            "results.group",
            json!({ "token": f.super_token, "cct": "A1", "group": "3CV" })
        ),
        "not_found"
    );
    assert_eq!(
        f.sidecar
            .request_err("results.school", json!({ "token": f.super_token, "cct": "ZZ" })),
        "not_found"
    );
}

#[test]
fn tier_listing_respects_scope() {
    let mut f = fixture("rafd-results-tier");

    let all = f.sidecar.request_ok(
        "results.byTier",
        json!({ "token": f.super_token, "tier": "REQUIERE APOYO" }),
    );
    assert_eq!(all["nivel"], "REQUIERE APOYO");
    assert_eq!(all["total"], 2);
    assert!(all["alumnos"]
        .as_array()
        .expect("alumnos")
        .iter()
        .all(|a| a["cct"] == "A1" && a["porcentaje"] == 50.0));

    let on_track = f
        .sidecar
        .request_ok("results.byTier", json!({ "token": f.b2_token, "tier": "on_track" }));
    assert_eq!(on_track["total"], 1);
    assert_eq!(on_track["alumnos"][0]["nombre"], "OMAR");
    assert_eq!(on_track["alumnos"][0]["grupo"], "1BV");

    let none = f.sidecar.request_ok(
        "results.byTier",
        json!({ "token": f.b2_token, "tier": "requires_support" }),
    );
    assert_eq!(none["total"], 0);

    assert_eq!(
        f.sidecar
            .request_err("results.byTier", json!({ "token": f.a1_token, "tier": "excelente" })),
        "bad_params"
    );
}
