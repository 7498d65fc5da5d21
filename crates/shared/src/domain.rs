use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(CollectionId);
id_newtype!(OwnerId);

/// Durable reference to one owned item.
///
/// Identity never depends on list position, so the same logical item keeps
/// the same id across reorders, pins and collection moves. The canonical
/// string form (`msg:12`, `owned:7:3`, `slug:plush-pepe-1`) is also the
/// serialized form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ItemId {
    Message { message_id: i64 },
    Owned { owner_id: OwnerId, saved_id: i64 },
    Slug { slug: String },
}

impl ItemId {
    pub fn message(message_id: i64) -> Self {
        Self::Message { message_id }
    }

    pub fn owned(owner_id: i64, saved_id: i64) -> Self {
        Self::Owned {
            owner_id: OwnerId(owner_id),
            saved_id,
        }
    }

    pub fn slug(slug: impl Into<String>) -> Self {
        Self::Slug { slug: slug.into() }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { message_id } => write!(f, "msg:{message_id}"),
            Self::Owned { owner_id, saved_id } => write!(f, "owned:{}:{saved_id}", owner_id.0),
            Self::Slug { slug } => write!(f, "slug:{slug}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid item reference '{0}'")]
pub struct InvalidItemId(pub String);

impl FromStr for ItemId {
    type Err = InvalidItemId;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidItemId(raw.to_string());
        let (kind, rest) = raw.split_once(':').ok_or_else(invalid)?;
        match kind {
            "msg" => rest.parse().map(Self::message).map_err(|_| invalid()),
            "owned" => {
                let (owner, saved) = rest.split_once(':').ok_or_else(invalid)?;
                let owner_id = owner.parse().map_err(|_| invalid())?;
                let saved_id = saved.parse().map_err(|_| invalid())?;
                Ok(Self::owned(owner_id, saved_id))
            }
            "slug" if !rest.is_empty() => Ok(Self::slug(rest)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for ItemId {
    type Error = InvalidItemId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.to_string()
    }
}

/// Render-only payload: decides ribbon and label decoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GiftKind {
    Generic,
    Unique { title: String, number: i32 },
}

impl GiftKind {
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Generic => None,
            Self::Unique { title, number } => Some(format!("{title} #{number}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum CollectionContext {
    #[default]
    AllItems,
    Collection(CollectionId),
}

impl CollectionContext {
    pub fn collection_id(&self) -> Option<CollectionId> {
        match self {
            Self::AllItems => None,
            Self::Collection(id) => Some(*id),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset_by(self, by: Vector) -> Self {
        Self {
            x: self.x + by.dx,
            y: self.y + by.dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
}

impl Vector {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn length_squared(self) -> f64 {
        self.dx * self.dx + self.dy * self.dy
    }
}

/// Axis-aligned hit-box reported by the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_string_form_parses_back() {
        for raw in ["msg:42", "owned:7:3", "slug:plush-pepe-1"] {
            let id: ItemId = raw.parse().expect("valid id");
            assert_eq!(id.to_string(), raw);
        }
    }

    #[test]
    fn item_id_rejects_malformed_references() {
        for raw in ["", "msg", "msg:x", "owned:7", "slug:", "peer:1"] {
            assert!(raw.parse::<ItemId>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn item_id_serializes_as_string() {
        let json = serde_json::to_string(&ItemId::owned(1, 2)).expect("serialize");
        assert_eq!(json, "\"owned:1:2\"");
        let back: ItemId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ItemId::owned(1, 2));
    }

    #[test]
    fn rect_contains_is_half_open() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect.contains(Point::new(0.0, 0.0)));
        assert!(rect.contains(Point::new(9.9, 9.9)));
        assert!(!rect.contains(Point::new(10.0, 5.0)));
        assert_eq!(rect.center(), Point::new(5.0, 5.0));
    }

    #[test]
    fn unique_gift_label_includes_number() {
        let kind = GiftKind::Unique {
            title: "Plush Pepe".into(),
            number: 12,
        };
        assert_eq!(kind.label().as_deref(), Some("Plush Pepe #12"));
        assert_eq!(GiftKind::Generic.label(), None);
    }
}
