pub mod song;
pub mod song_list;

pub use song::{compose_sub_name, int_value, DownloadStatus, Membership, Song, SONG_FIELD_MAP};
pub use song_list::ListType;
