// Render hints: descriptive UI payloads returned alongside tool data

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of UI component a renderer should draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderKind {
    Card,
    Table,
    Alert,
    ImageCard,
}

/// Severity of an alert hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
}

/// A tagged, nested UI description. Never interpreted by the core.
///
/// `uiData` is carried on the wire as a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderHint {
    #[serde(rename = "type")]
    pub kind: RenderKind,
    #[serde(rename = "uiData", with = "json_string")]
    pub ui_data: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RenderHint>,
}

impl RenderHint {
    pub fn new(kind: RenderKind, ui_data: Value) -> Self {
        Self {
            kind,
            ui_data,
            children: Vec::new(),
        }
    }

    pub fn card(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            RenderKind::Card,
            serde_json::json!({
                "title": title.into(),
                "content": content.into(),
            }),
        )
    }

    /// Table with `{key, header}` columns; each row is an object keyed by column key.
    pub fn table(columns: &[(&str, &str)], rows: Vec<Value>) -> Self {
        let columns: Vec<Value> = columns
            .iter()
            .map(|(key, header)| serde_json::json!({ "key": key, "header": header }))
            .collect();

        Self::new(
            RenderKind::Table,
            serde_json::json!({
                "columns": columns,
                "rows": rows,
            }),
        )
    }

    pub fn alert(level: AlertLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            RenderKind::Alert,
            serde_json::json!({
                "type": level,
                "title": title.into(),
                "message": message.into(),
            }),
        )
    }

    pub fn image_card(
        title: impl Into<String>,
        image_url: Option<&str>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            RenderKind::ImageCard,
            serde_json::json!({
                "title": title.into(),
                "imageUrl": image_url,
                "description": description.into(),
            }),
        )
    }

    pub fn with_child(mut self, child: RenderHint) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = RenderHint>) -> Self {
        self.children.extend(children);
        self
    }
}

mod json_string {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = serde_json::to_string(value).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        serde_json::from_str(&encoded).map_err(D::Error::custom)
    }
}
