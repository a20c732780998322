//! Reconciliation of exported JSON into the song database.

use xiami_core::model::{ListType, Membership};
use xiami_core::schema::{Database, ListIngest, SongUpsert};

use crate::category::FavCategory;
use crate::error::EtlResult;
use crate::store::FileStore;

/// Counts from a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub lists: usize,
    pub created: usize,
    /// Songs that already existed and only had a membership flag set.
    pub flagged: usize,
    pub skipped: usize,
}

impl IngestSummary {
    fn add_list(&mut self, list: ListIngest) {
        self.lists += 1;
        self.created += list.created;
        self.flagged += list.flagged;
        self.skipped += list.skipped;
    }
}

/// Create a song row for every favorited song, in merged page order.
///
/// Songs already in the database only get `in_songs` set. With `reset`, the
/// song and membership tables are emptied first.
pub fn create_songs_db(db: &mut Database, store: &FileStore, reset: bool) -> EtlResult<IngestSummary> {
    if reset {
        log::info!("clearing song tables");
        db.clear()?;
    }

    let mut summary = IngestSummary::default();
    for (id, record) in store.merge_records(FavCategory::Songs)? {
        let row_number = db.next_row_number()?;
        match db.create_song(&record, row_number, Membership::Songs) {
            Ok(SongUpsert::Created) => {
                log::debug!("created song {id} as row {row_number}");
                summary.created += 1;
            }
            Ok(SongUpsert::Flagged) => summary.flagged += 1,
            Err(xiami_core::Error::InvalidData(reason)) => {
                log::warn!("skipping song {id}: {reason}");
                summary.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    log::info!(
        "songs: {} created, {} already present, {} skipped",
        summary.created,
        summary.flagged,
        summary.skipped
    );
    Ok(summary)
}

/// Ingest the songs of every exported detail document of `list_type`.
///
/// Each list is applied in its own transaction.
pub fn ingest_details(
    db: &mut Database,
    store: &FileStore,
    list_type: ListType,
) -> EtlResult<IngestSummary> {
    let mut summary = IngestSummary::default();
    for list_id in store.detail_ids(list_type)? {
        let songs = store.detail_songs(list_type, list_id)?;
        let result = db.ingest_list(list_type, list_id, &songs)?;
        log::info!(
            "{list_type} {list_id}: {} created, {} flagged, {} skipped",
            result.created,
            result.flagged,
            result.skipped
        );
        summary.add_list(result);
    }
    Ok(summary)
}

pub fn ingest_album_details(db: &mut Database, store: &FileStore) -> EtlResult<IngestSummary> {
    ingest_details(db, store, ListType::Album)
}

pub fn ingest_playlist_details(db: &mut Database, store: &FileStore) -> EtlResult<IngestSummary> {
    ingest_details(db, store, ListType::Playlist)
}
