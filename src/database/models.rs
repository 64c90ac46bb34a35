use serde::{Deserialize, Serialize};

/// One row of `video_hashes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub video_name: String,
    pub frame_path: String,
    pub phash: String,
}

impl HashRecord {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            video_name: row.get(0)?,
            frame_path: row.get(1)?,
            phash: row.get(2)?,
        })
    }
}
