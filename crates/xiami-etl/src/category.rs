//! Favorites categories and how each one is requested and stored.

use std::fmt;
use std::str::FromStr;

/// Path of the favorites endpoint shared by most categories.
pub const FAVORITES_PATH: &str = "/api/favorite/getFavorites";

/// Path listing the playlists a user created.
pub const MY_PLAYLISTS_PATH: &str = "/api/collect/getCollectByUser";

/// A remote favorites collection exported page by page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FavCategory {
    Songs,
    Albums,
    Artists,
    Playlists,
    /// Playlists created by the user rather than favorited.
    MyPlaylists,
}

impl FavCategory {
    pub const ALL: [Self; 5] = [
        Self::Songs,
        Self::Albums,
        Self::Artists,
        Self::Playlists,
        Self::MyPlaylists,
    ];

    /// The `type` value sent in the request payload.
    #[must_use]
    pub const fn type_code(self) -> u32 {
        match self {
            Self::Songs => 1,
            Self::Albums => 2,
            Self::Artists => 3,
            Self::Playlists => 5,
            Self::MyPlaylists => 0,
        }
    }

    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::MyPlaylists => MY_PLAYLISTS_PATH,
            _ => FAVORITES_PATH,
        }
    }

    /// Key of the item list inside the response's `data` object.
    #[must_use]
    pub const fn data_key(self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Albums => "albums",
            Self::Artists => "artists",
            Self::Playlists | Self::MyPlaylists => "collects",
        }
    }

    /// Key holding each record's remote ID.
    #[must_use]
    pub const fn id_key(self) -> &'static str {
        match self {
            Self::Songs => "songId",
            Self::Albums => "albumId",
            Self::Artists => "artistId",
            Self::Playlists | Self::MyPlaylists => "listId",
        }
    }

    /// Prefix of page file names (`songs-3.json`).
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Albums => "albums",
            Self::Artists => "artists",
            Self::Playlists => "playlists",
            Self::MyPlaylists => "my_playlists",
        }
    }

    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        self.file_stem()
    }
}

impl fmt::Display for FavCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

impl FromStr for FavCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.file_stem() == normalized)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}
