//! Catalog entities and the composite view returned by the service.

use serde::{Deserialize, Serialize};

/// Primary entity, looked up by its unique human-assigned `name`.
///
/// `id` is assigned by the store on first save and preserved afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

impl Series {
    /// A series that has not been saved yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    /// Returns a copy carrying `id`.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Secondary entity, owned by the series whose name is `series_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub series_name: String,
    pub title: String,
}

impl Episode {
    /// An episode that has not been saved yet.
    pub fn new(series_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            series_name: series_name.into(),
            title: title.into(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Externally visible fields of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeView {
    pub series_name: String,
    pub title: String,
}

impl From<&Episode> for EpisodeView {
    fn from(episode: &Episode) -> Self {
        Self {
            series_name: episode.series_name.clone(),
            title: episode.title.clone(),
        }
    }
}

impl From<Episode> for EpisodeView {
    fn from(episode: Episode) -> Self {
        Self {
            series_name: episode.series_name,
            title: episode.title,
        }
    }
}

/// A series joined with its fully materialized episode list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesView {
    pub id: Option<String>,
    pub name: String,
    pub episodes: Vec<EpisodeView>,
}

impl SeriesView {
    pub fn assemble(series: Series, episodes: Vec<EpisodeView>) -> Self {
        Self {
            id: series.id,
            name: series.name,
            episodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsaved_series_serializes_without_id() {
        let json = serde_json::to_string(&Series::new("Naruto")).unwrap();
        assert_eq!(json, r#"{"name":"Naruto"}"#);

        let parsed: Series = serde_json::from_str(r#"{"name":"Bleach"}"#).unwrap();
        assert_eq!(parsed, Series::new("Bleach"));
    }

    #[test]
    fn test_view_hides_episode_id() {
        let episode = Episode::new("Naruto", "Enter: Naruto Uzumaki!").with_id("e-1");
        let view = SeriesView::assemble(
            Series::new("Naruto").with_id("s-1"),
            vec![EpisodeView::from(&episode)],
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "s-1");
        assert_eq!(json["episodes"][0]["title"], "Enter: Naruto Uzumaki!");
        assert!(json["episodes"][0].get("id").is_none());
    }
}
