//! The screen id this device was paired as.

use rusqlite::params;
use signwall_shared::ScreenId;

use crate::cache::{get_meta, put_meta, ENTRY_KEYS};
use crate::database::Database;
use crate::error::Result;

const KEY_SCREEN_ID: &str = "screen_id";

impl Database {
    pub fn load_screen_id(&self) -> Result<Option<ScreenId>> {
        Ok(get_meta(self.conn(), KEY_SCREEN_ID)?
            .filter(|id| !id.is_empty())
            .map(ScreenId))
    }

    pub fn save_screen_id(&self, screen_id: &ScreenId) -> Result<()> {
        put_meta(self.conn(), KEY_SCREEN_ID, screen_id.as_str())?;
        tracing::info!(screen = %screen_id, "screen paired");
        Ok(())
    }

    /// Forget the pairing along with the cache entry and media that were
    /// fetched for it.
    pub fn clear_pairing(&mut self) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute("DELETE FROM cache_meta WHERE key = ?1", params![KEY_SCREEN_ID])?;
        for key in ENTRY_KEYS {
            tx.execute("DELETE FROM cache_meta WHERE key = ?1", params![key])?;
        }
        tx.execute("DELETE FROM media", [])?;
        tx.execute("DELETE FROM media_staging", [])?;
        tx.commit()?;
        tracing::info!("pairing cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CachedMedia;
    use signwall_shared::{Assignment, GroupId, Layout, Media, MediaId, ScheduleSlot, SyncMode};

    #[test]
    fn screen_id_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let db = Database::open_at(&path).unwrap();
            assert_eq!(db.load_screen_id().unwrap(), None);
            db.save_screen_id(&ScreenId::from("lobby-left")).unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.load_screen_id().unwrap(), Some(ScreenId::from("lobby-left")));
    }

    #[test]
    fn clearing_pairing_drops_the_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open_at(&dir.path().join("cache.db")).unwrap();
        db.save_screen_id(&ScreenId::from("lobby-left")).unwrap();

        let media = Media {
            id: MediaId::from("a"),
            file_type: "image/png".into(),
            file_url: "https://cdn.example/a.png".into(),
            file_name: "a.png".into(),
        };
        db.begin_refresh().unwrap();
        db.stage_media(&CachedMedia::from_download(&media, b"aaa"), b"aaa")
            .unwrap();
        let assignment = Assignment {
            group_id: GroupId::from("lobby"),
            sync_mode: SyncMode::Extend,
            version: "2024-01-01T00:00:00Z".parse().unwrap(),
            member_screen_ids: vec!["lobby-left".into()],
        };
        let slots = vec![ScheduleSlot {
            slot_index: 0,
            layout: Layout::Span1,
            duration_seconds: Some(5),
            media_ids: vec![Some(MediaId::from("a"))],
        }];
        db.commit_refresh(&assignment, &slots).unwrap();
        assert!(db.load_cache().unwrap().is_some());

        db.clear_pairing().unwrap();
        assert_eq!(db.load_screen_id().unwrap(), None);
        assert!(db.load_cache().unwrap().is_none());
        assert!(!db.has_media(&MediaId::from("a")).unwrap());
    }
}
