//! Export of favorites pages and list details to the JSON store.

use serde_json::Value;
use xiami_core::model::ListType;
use xiami_core::trim;

use crate::category::FavCategory;
use crate::client::XiamiClient;
use crate::error::EtlResult;
use crate::store::FileStore;

/// Outcome of a page export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageExport {
    pub pages: u32,
    pub records: usize,
}

/// Outcome of a detail export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailExport {
    pub fetched: usize,
    /// Already on disk from an earlier run.
    pub skipped: usize,
}

/// Walks remote pages and writes them to a [`FileStore`].
#[derive(Debug)]
pub struct Exporter<'a> {
    client: &'a XiamiClient,
    store: &'a FileStore,
}

fn trim_records(category: FavCategory, records: &mut [Value]) {
    match category {
        FavCategory::Songs => trim::trim_all(records, trim::trim_song),
        FavCategory::Albums => trim::trim_all(records, trim::trim_album),
        FavCategory::Artists | FavCategory::Playlists | FavCategory::MyPlaylists => {}
    }
}

impl<'a> Exporter<'a> {
    pub fn new(client: &'a XiamiClient, store: &'a FileStore) -> Self {
        Self { client, store }
    }

    /// Export every page of `category`, or just `only_page`.
    ///
    /// Walks from page 1 until a page comes back empty. Each page is written
    /// as soon as it arrives, so an interrupted run keeps what it fetched.
    pub async fn export_pages(
        &self,
        category: FavCategory,
        only_page: Option<u32>,
    ) -> EtlResult<PageExport> {
        let mut summary = PageExport::default();
        let mut page = only_page.unwrap_or(1);

        loop {
            let mut records = self.client.get_favorites(category, page).await?;
            if records.is_empty() {
                log::info!("{category} page {page} is empty, export finished");
                break;
            }

            trim_records(category, &mut records);
            let path = self.store.write_page(category, page, &records)?;
            log::info!("wrote {} records to {}", records.len(), path.display());
            summary.pages += 1;
            summary.records += records.len();

            if only_page.is_some() {
                break;
            }
            page += 1;
        }

        Ok(summary)
    }

    /// Fetch the detail of every favorited album not yet on disk.
    pub async fn export_album_details(&self) -> EtlResult<DetailExport> {
        let ids: Vec<i64> = self
            .store
            .merge_records(FavCategory::Albums)?
            .into_keys()
            .collect();
        let mut summary = DetailExport::default();

        for id in ids {
            if self.store.detail_exists(ListType::Album, id) {
                log::debug!("album detail {id} already exported");
                summary.skipped += 1;
                continue;
            }
            let mut detail = self.client.get_album_detail(id).await?;
            if let Some(record) = detail.as_object_mut() {
                trim::trim_album(record);
            }
            let path = self.store.write_detail(ListType::Album, id, &detail)?;
            log::info!("wrote album detail {}", path.display());
            summary.fetched += 1;
        }

        Ok(summary)
    }

    /// Fetch the detail of every favorited playlist (or, with `mine`, every
    /// playlist the user created) not yet on disk.
    pub async fn export_playlist_details(&self, mine: bool) -> EtlResult<DetailExport> {
        let category = if mine {
            FavCategory::MyPlaylists
        } else {
            FavCategory::Playlists
        };
        let ids: Vec<i64> = self.store.merge_records(category)?.into_keys().collect();
        let mut summary = DetailExport::default();

        for id in ids {
            if self.store.detail_exists(ListType::Playlist, id) {
                log::debug!("playlist detail {id} already exported");
                summary.skipped += 1;
                continue;
            }
            let mut detail = self.client.get_playlist_detail(id).await?;
            if let Some(record) = detail.as_object_mut() {
                trim::trim_embedded_songs(record);
            }
            let path = self.store.write_detail(ListType::Playlist, id, &detail)?;
            log::info!("wrote playlist detail {}", path.display());
            summary.fetched += 1;
        }

        Ok(summary)
    }
}
