use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::text::strip_bom;
use crate::token::Session;

pub const AUTH_DATA_FILE: &str = "auth-data.json";

// 0/O and 1/l/I are left out.
const SIMPLE_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";
const MIXED_ALPHABET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789ABCDEFGHJKMNPQRSTUVWXYZ";
const SUPER_PASSWORD_LEN: usize = 10;
const SCHOOL_PASSWORD_LEN: usize = 8;
const SYNC_PASSWORD_LEN: usize = 12;

/// Digest file: sha256-hex of the normalized password per account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub super_usuario: String,
    pub escuelas: BTreeMap<String, String>,
}

impl AuthData {
    /// Tolerant read: BOM stripped, legacy `super` key accepted, non-string
    /// entries ignored.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let raw: serde_json::Value =
            serde_json::from_str(strip_bom(text)).context("auth data is not valid JSON")?;
        let obj = raw
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("auth data must be a JSON object"))?;

        let super_hash = obj
            .iter()
            .find(|(k, _)| {
                let k = k.trim_start_matches('\u{FEFF}');
                k == "superUsuario" || k == "super"
            })
            .and_then(|(_, v)| v.as_str())
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let escuelas = obj
            .get("escuelas")
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(cct, h)| {
                        h.as_str()
                            .map(|h| (cct.clone(), h.trim().to_ascii_lowercase()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            super_usuario: super_hash,
            escuelas,
        })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        Self::parse(&text)
    }

    /// Missing or broken files read as "no accounts"; the failure is logged.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "auth data unavailable");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.to_string_lossy()))?;
        }
        let text = serde_json::to_string_pretty(self).context("failed to serialize auth data")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.to_string_lossy()))
    }
}

/// Overrides read from the environment at startup.
#[derive(Debug, Clone, Default)]
pub struct SuperOverrides {
    pub password: Option<String>,
    pub hash: Option<String>,
}

impl SuperOverrides {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            password: cfg.super_password.clone(),
            hash: cfg.super_hash.clone(),
        }
    }
}

pub fn normalize_password(password: &str) -> String {
    password
        .chars()
        .filter(|c| !c.is_whitespace())
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .collect()
}

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn same(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Resolves a plaintext password to the account it unlocks.
pub fn verify_password(
    password: &str,
    auth: &AuthData,
    overrides: &SuperOverrides,
) -> Option<Session> {
    let normalized = normalize_password(password);
    if normalized.is_empty() {
        return None;
    }

    if let Some(env_pw) = overrides.password.as_deref() {
        let env_pw = normalize_password(env_pw);
        if !env_pw.is_empty() && same(&normalized, &env_pw) {
            return Some(Session::Super);
        }
    }

    let digest = hash_password(&normalized);
    let super_hash = overrides
        .hash
        .as_deref()
        .filter(|h| !h.is_empty())
        .unwrap_or(&auth.super_usuario);
    if !super_hash.is_empty() && same(&digest, super_hash) {
        return Some(Session::Super);
    }

    auth.escuelas
        .iter()
        .find(|(_, h)| !h.is_empty() && same(&digest, h))
        .map(|(cct, _)| Session::School { cct: cct.clone() })
}

fn random_password<R: Rng>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCredentials {
    pub auth: AuthData,
    pub super_password: String,
    /// (cct, plaintext password), in input order.
    pub school_passwords: Vec<(String, String)>,
}

/// Fresh accounts for every school plus the super user. Passwords are unique.
pub fn generate_credentials<R: Rng>(ccts: &[String], rng: &mut R) -> GeneratedCredentials {
    let super_password = random_password(rng, SIMPLE_ALPHABET, SUPER_PASSWORD_LEN);
    let mut used: BTreeSet<String> = BTreeSet::new();
    used.insert(super_password.clone());

    let mut escuelas = BTreeMap::new();
    let mut school_passwords = Vec::new();
    for cct in ccts {
        if escuelas.contains_key(cct) {
            continue;
        }
        let pwd = loop {
            let candidate = random_password(rng, SIMPLE_ALPHABET, SCHOOL_PASSWORD_LEN);
            if used.insert(candidate.clone()) {
                break candidate;
            }
        };
        escuelas.insert(cct.clone(), hash_password(&normalize_password(&pwd)));
        school_passwords.push((cct.clone(), pwd));
    }

    GeneratedCredentials {
        auth: AuthData {
            super_usuario: hash_password(&normalize_password(&super_password)),
            escuelas,
        },
        super_password,
        school_passwords,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub added: Vec<(String, String)>,
    pub removed: Vec<String>,
}

/// Brings the per-school accounts in line with the schools present in the data.
/// The super account is never touched.
pub fn sync_school_credentials<R: Rng>(
    auth: &mut AuthData,
    ccts: &[String],
    rng: &mut R,
) -> SyncReport {
    let wanted: BTreeSet<&str> = ccts.iter().map(String::as_str).collect();
    let mut report = SyncReport::default();

    for cct in &wanted {
        let missing = auth.escuelas.get(*cct).map(|h| h.is_empty()).unwrap_or(true);
        if missing {
            let pwd = random_password(rng, MIXED_ALPHABET, SYNC_PASSWORD_LEN);
            auth.escuelas
                .insert(cct.to_string(), hash_password(&normalize_password(&pwd)));
            report.added.push((cct.to_string(), pwd));
        }
    }

    let stale: Vec<String> = auth
        .escuelas
        .keys()
        .filter(|k| !wanted.contains(k.as_str()))
        .cloned()
        .collect();
    for cct in stale {
        auth.escuelas.remove(&cct);
        report.removed.push(cct);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn auth_with(super_pw: &str, schools: &[(&str, &str)]) -> AuthData {
        AuthData {
            super_usuario: hash_password(super_pw),
            escuelas: schools
                .iter()
                .map(|(cct, pw)| (cct.to_string(), hash_password(pw)))
                .collect(),
        }
    }

    #[test]
    fn hash_is_lowercase_sha256_hex() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn normalization_strips_spaces_and_zero_width() {
        assert_eq!(normalize_password("  ab c\t d\u{200B}\u{FEFF} "), "abcd");
        assert_eq!(normalize_password("\u{200C}\u{200D}"), "");
    }

    #[test]
    fn passwords_resolve_to_accounts() {
        let auth = auth_with("superpw", &[("26DES0001X", "pw-one"), ("26DES0002Y", "pw-two")]);
        let none = SuperOverrides::default();
        assert_eq!(verify_password(" super pw ", &auth, &none), Some(Session::Super));
        assert_eq!(
            verify_password("pw-two", &auth, &none),
            Some(Session::School {
                cct: "26DES0002Y".to_string()
            })
        );
        assert_eq!(verify_password("nope", &auth, &none), None);
        assert_eq!(verify_password("   ", &auth, &none), None);
    }

    #[test]
    fn environment_overrides_take_precedence() {
        let auth = auth_with("filepw", &[]);
        let overrides = SuperOverrides {
            password: Some("envpw".to_string()),
            hash: Some(hash_password("hashpw")),
        };
        assert_eq!(verify_password("envpw", &auth, &overrides), Some(Session::Super));
        assert_eq!(verify_password("hashpw", &auth, &overrides), Some(Session::Super));
        // The env hash replaces the file's super digest.
        assert_eq!(verify_password("filepw", &auth, &overrides), None);
    }

    #[test]
    fn parse_accepts_bom_and_legacy_super_key() {
        let text = format!(
            "\u{FEFF}{{\"super\":\" {} \",\"escuelas\":{{\"A\":\"{}\",\"B\":5}}}}",
            hash_password("x").to_uppercase(),
            hash_password("y")
        );
        let auth = AuthData::parse(&text).expect("parse");
        assert_eq!(auth.super_usuario, hash_password("x"));
        assert_eq!(auth.escuelas.len(), 1);
        assert!(AuthData::parse("[]").is_err());
    }

    #[test]
    fn generated_credentials_verify_and_are_unique() {
        let mut rng = StdRng::seed_from_u64(7);
        let ccts: Vec<String> = (0..20).map(|i| format!("26DES{:04}X", i)).collect();
        let generated = generate_credentials(&ccts, &mut rng);
        assert_eq!(generated.super_password.len(), SUPER_PASSWORD_LEN);
        assert_eq!(generated.school_passwords.len(), ccts.len());

        let none = SuperOverrides::default();
        assert_eq!(
            verify_password(&generated.super_password, &generated.auth, &none),
            Some(Session::Super)
        );
        let mut seen = BTreeSet::new();
        for (cct, pwd) in &generated.school_passwords {
            assert_eq!(pwd.len(), SCHOOL_PASSWORD_LEN);
            assert!(pwd.bytes().all(|b| SIMPLE_ALPHABET.contains(&b)));
            assert!(seen.insert(pwd.clone()));
            assert_eq!(
                verify_password(pwd, &generated.auth, &none),
                Some(Session::School { cct: cct.clone() })
            );
        }
    }

    #[test]
    fn sync_adds_new_and_drops_stale_schools() {
        let mut auth = auth_with("superpw", &[("KEEP", "k"), ("GONE", "g")]);
        let before_super = auth.super_usuario.clone();
        let mut rng = StdRng::seed_from_u64(1);
        let report = sync_school_credentials(
            &mut auth,
            &["KEEP".to_string(), "NEW".to_string()],
            &mut rng,
        );
        assert_eq!(report.removed, vec!["GONE".to_string()]);
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].0, "NEW");
        assert_eq!(report.added[0].1.len(), SYNC_PASSWORD_LEN);
        assert_eq!(auth.escuelas.get("KEEP"), Some(&hash_password("k")));
        assert_eq!(auth.super_usuario, before_super);

        let again = sync_school_credentials(
            &mut auth,
            &["KEEP".to_string(), "NEW".to_string()],
            &mut rng,
        );
        assert_eq!(again, SyncReport::default());
    }

    #[test]
    fn save_and_load_round_trip_on_disk() {
        let dir = std::env::temp_dir().join(format!(
            "rafd-auth-{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let path = dir.join(AUTH_DATA_FILE);
        let auth = auth_with("s", &[("A", "a")]);
        auth.save(&path).expect("save");
        assert_eq!(AuthData::load(&path).expect("load"), auth);
        assert_eq!(AuthData::load_or_empty(&dir.join("missing.json")), AuthData::default());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
