//! Domain models for the work catalog
//!
//! The identifier codec lives here as [`WorkId`]: every place that derives a
//! display code from a numeric id (task keys, log prefixes, cover file names,
//! artwork URLs) goes through [`WorkId::code`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use bridge_traits::filesystem::FolderDescriptor;

// =============================================================================
// ID Types
// =============================================================================

/// Ids at or above this value use the long, 8-digit code.
pub const LONG_CODE_THRESHOLD: u32 = 1_000_000;

/// Numeric work identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub u32);

impl WorkId {
    /// Zero-padded code: 8 digits from [`LONG_CODE_THRESHOLD`] up, 6 below.
    pub fn code(&self) -> String {
        if self.0 >= LONG_CODE_THRESHOLD {
            format!("{:08}", self.0)
        } else {
            format!("{:06}", self.0)
        }
    }

    /// The id rounded up to the next multiple of 1000, unless it already is one.
    ///
    /// Artwork is sharded on the provider by this value.
    pub fn bucket(&self) -> WorkId {
        if self.0 % 1000 == 0 {
            *self
        } else {
            WorkId((self.0 / 1000) * 1000 + 1000)
        }
    }

    pub fn as_i64(&self) -> i64 {
        i64::from(self.0)
    }
}

impl From<u32> for WorkId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RJ{}", self.code())
    }
}

/// Namespace for name-derived voice actor ids.
pub const VOICE_ACTOR_NAMESPACE: Uuid = Uuid::from_u128(0x699d_9c07_b965_4399_bafd_18a3_cacf_073c);

/// Voice actor id derived from the actor's name, so a name always maps to the
/// same row.
pub fn voice_actor_id(name: &str) -> Uuid {
    Uuid::new_v5(&VOICE_ACTOR_NAMESPACE, name.as_bytes())
}

/// Names whose derived ids collided in older catalogs.
pub const COLLIDING_VOICE_ACTOR_NAMES: &[&str] = &["かの仔", "こっこ"];

// =============================================================================
// Catalog entities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circle {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Synthetic tag id marking works that ship subtitle files.
pub const SUBTITLE_TAG_ID: i64 = -1;
pub const SUBTITLE_TAG_NAME: &str = "中文字幕";

impl Tag {
    pub fn subtitle() -> Self {
        Self {
            id: SUBTITLE_TAG_ID,
            name: SUBTITLE_TAG_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceActor {
    pub id: Uuid,
    pub name: String,
}

impl VoiceActor {
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: voice_actor_id(&name),
            name,
        }
    }
}

/// Sales and rating figures that change over a work's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicMetadata {
    pub dl_count: Option<i64>,
    pub price: Option<i64>,
    pub review_count: Option<i64>,
    pub rate_count: Option<i64>,
    pub rate_average_2dp: Option<f64>,
    /// Provider-defined rating histogram, stored as JSON text.
    pub rate_count_detail: Option<serde_json::Value>,
    /// Provider-defined ranking history, stored as JSON text.
    pub rank: Option<serde_json::Value>,
}

/// A scraped work record, as returned by the metadata provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub id: WorkId,
    pub title: String,
    pub circle: Circle,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(flatten)]
    pub dynamic: DynamicMetadata,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub vas: Vec<VoiceActor>,
    /// Set by the ingestor when subtitle files sit next to the tracks.
    #[serde(default)]
    pub has_subtitle: bool,
}

impl WorkMetadata {
    /// Flag the work as subtitled and add the synthetic tag once.
    pub fn mark_subtitled(&mut self) {
        self.has_subtitle = true;
        if !self.tags.iter().any(|tag| tag.id == SUBTITLE_TAG_ID) {
            self.tags.push(Tag::subtitle());
        }
    }
}

/// Where a work lives on disk, relative to a configured root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkLocation {
    pub id: WorkId,
    pub root_folder: String,
    pub dir: String,
}

impl WorkLocation {
    pub fn from_descriptor(folder: &FolderDescriptor) -> Self {
        Self {
            id: WorkId(folder.work_id),
            root_folder: folder.root_folder_name.clone(),
            dir: folder.relative_path.to_string_lossy().into_owned(),
        }
    }
}

/// Column groups refreshed by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub include_dynamic: bool,
    pub include_tags: bool,
    pub include_va: bool,
}

impl UpdateOptions {
    /// Dynamic columns and tags.
    pub fn full() -> Self {
        Self {
            include_dynamic: true,
            include_tags: true,
            include_va: false,
        }
    }

    /// Voice actor relations only.
    pub fn voice_actors() -> Self {
        Self {
            include_va: true,
            ..Self::default()
        }
    }

    pub fn dynamic_only() -> Self {
        Self {
            include_dynamic: true,
            ..Self::default()
        }
    }

    /// Names of the column groups this update rewrites.
    pub fn field_names(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.include_dynamic {
            fields.push("dynamic".to_string());
        }
        if self.include_tags {
            fields.push("tags".to_string());
        }
        if self.include_va {
            fields.push("vas".to_string());
        }
        fields
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserGroup {
    Administrator,
    User,
    Guest,
}

impl UserGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserGroup::Administrator => "administrator",
            UserGroup::User => "user",
            UserGroup::Guest => "guest",
        }
    }
}

/// Account to create. The password is hashed by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub password: String,
    pub group: UserGroup,
}

impl NewUser {
    /// The built-in administrator account.
    pub fn default_admin() -> Self {
        Self {
            name: "admin".to_string(),
            password: "admin".to_string(),
            group: UserGroup::Administrator,
        }
    }
}
