//! Device pairing.
//!
//! A new device trades the six-digit code shown in the admin console for
//! its screen id once, then keeps the id in the cache database. Unpairing
//! forgets the id together with everything cached for it.

use tracing::{info, warn};

use signwall_shared::ScreenId;
use signwall_store::Database;

use crate::backend::Backend;
use crate::config::PlayerConfig;
use crate::error::PairingError;

pub const PAIRING_CODE_LEN: usize = 6;

/// Strip whitespace and check the code is exactly six digits.
pub fn normalize_code(code: &str) -> Result<String, PairingError> {
    let code: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if code.len() == PAIRING_CODE_LEN && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(PairingError::InvalidCode {
            expected: PAIRING_CODE_LEN,
        })
    }
}

/// The screen id to run as: the configured override, else the stored
/// pairing, else a fresh pairing with the configured code.
pub async fn resolve_screen_id<B>(
    config: &PlayerConfig,
    db: &Database,
    backend: &B,
) -> Result<ScreenId, PairingError>
where
    B: Backend + ?Sized,
{
    if let Some(screen_id) = &config.screen_id {
        return Ok(screen_id.clone());
    }
    if let Some(screen_id) = db.load_screen_id()? {
        return Ok(screen_id);
    }
    match &config.pairing_code {
        Some(code) => pair(db, backend, code).await,
        None => Err(PairingError::NotPaired),
    }
}

/// Exchange `code` for a screen id and store it.
pub async fn pair<B>(db: &Database, backend: &B, code: &str) -> Result<ScreenId, PairingError>
where
    B: Backend + ?Sized,
{
    let code = normalize_code(code)?;
    let screen_id = match backend.pair(&code).await {
        Ok(screen_id) => screen_id,
        Err(e) => {
            warn!(error = %e, "Pairing failed");
            return Err(e.into());
        }
    };
    db.save_screen_id(&screen_id)?;
    info!(screen = %screen_id, "Device paired");
    Ok(screen_id)
}

/// Forget this device's pairing and its cache.
pub fn unpair(db: &mut Database) -> Result<(), PairingError> {
    db.clear_pairing()?;
    info!("Device unpaired");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::sync::tests::MockBackend;
    use tempfile::TempDir;

    fn open() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(&dir.path().join("cache.db")).unwrap();
        (dir, db)
    }

    fn with_code(code: &str) -> PlayerConfig {
        PlayerConfig {
            pairing_code: Some(code.to_string()),
            ..PlayerConfig::default()
        }
    }

    #[test]
    fn codes_are_six_digits() {
        assert_eq!(normalize_code(" 123 456 ").unwrap(), "123456");
        assert!(normalize_code("12345").is_err());
        assert!(normalize_code("1234567").is_err());
        assert!(normalize_code("12a456").is_err());
    }

    #[tokio::test]
    async fn code_pairs_once_then_stored_id_is_used() {
        let (_dir, db) = open();
        let backend = MockBackend::default();
        backend
            .state()
            .pairing_codes
            .insert("482913".into(), ScreenId::from("lobby-left"));

        let first = resolve_screen_id(&with_code("482 913"), &db, &backend)
            .await
            .unwrap();
        assert_eq!(first, ScreenId::from("lobby-left"));
        assert_eq!(db.load_screen_id().unwrap(), Some(first.clone()));

        // Later boots need no code and do not call the backend again.
        let again = resolve_screen_id(&PlayerConfig::default(), &db, &backend)
            .await
            .unwrap();
        assert_eq!(again, first);
        assert_eq!(backend.state().pair_calls, 1);
    }

    #[tokio::test]
    async fn configured_id_overrides_pairing() {
        let (_dir, db) = open();
        db.save_screen_id(&ScreenId::from("stored")).unwrap();
        let config = PlayerConfig {
            screen_id: Some(ScreenId::from("override")),
            ..PlayerConfig::default()
        };
        let backend = MockBackend::default();
        assert_eq!(
            resolve_screen_id(&config, &db, &backend).await.unwrap(),
            ScreenId::from("override")
        );
    }

    #[tokio::test]
    async fn unpaired_device_without_code_cannot_start() {
        let (_dir, db) = open();
        let backend = MockBackend::default();
        assert!(matches!(
            resolve_screen_id(&PlayerConfig::default(), &db, &backend).await,
            Err(PairingError::NotPaired)
        ));
    }

    #[tokio::test]
    async fn rejected_or_malformed_codes_store_nothing() {
        let (_dir, db) = open();
        let backend = MockBackend::default();

        assert!(matches!(
            resolve_screen_id(&with_code("12-34"), &db, &backend).await,
            Err(PairingError::InvalidCode { expected: 6 })
        ));
        assert_eq!(backend.state().pair_calls, 0);

        assert!(matches!(
            resolve_screen_id(&with_code("000000"), &db, &backend).await,
            Err(PairingError::Backend(BackendError::PairingRejected(_)))
        ));
        assert_eq!(db.load_screen_id().unwrap(), None);
    }

    #[tokio::test]
    async fn unpair_forgets_the_screen_id() {
        let (_dir, mut db) = open();
        db.save_screen_id(&ScreenId::from("lobby-left")).unwrap();
        unpair(&mut db).unwrap();
        assert_eq!(db.load_screen_id().unwrap(), None);
    }
}
