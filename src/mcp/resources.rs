//! Resource catalog: read-only JSON documents addressed by `stash://` URIs.

use serde::Serialize;
use serde_json::{json, Value};

use crate::analysis::{AnalysisEngine, ProfileSummary};
use crate::filter::{FilterCriterion, FilterField, FilterSet};
use crate::gateway::Performer;
use crate::types::{Error, Result};

const SCHEME: &str = "stash://";
const MIME_JSON: &str = "application/json";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

pub const RESOURCES: [ResourceInfo; 2] = [
    ResourceInfo {
        uri: "stash://performers/favorites",
        name: "Favorite Performers",
        description: "Every favorite performer with country, ethnicity, physical data and tags",
        mime_type: MIME_JSON,
    },
    ResourceInfo {
        uri: "stash://performers/stats",
        name: "Performer Statistics",
        description: "Statistical summary of the favorite performers",
        mime_type: MIME_JSON,
    },
];

pub const TEMPLATES: [ResourceTemplate; 3] = [
    ResourceTemplate {
        uri_template: "stash://performer/{name}",
        name: "Performer Information",
        description: "Detailed profile of one performer",
        mime_type: MIME_JSON,
    },
    ResourceTemplate {
        uri_template: "stash://performers/country/{country}",
        name: "Performers by Country",
        description: "Favorite performers from one country",
        mime_type: MIME_JSON,
    },
    ResourceTemplate {
        uri_template: "stash://performers/ethnicity/{ethnicity}",
        name: "Performers by Ethnicity",
        description: "Favorite performers of one ethnicity",
        mime_type: MIME_JSON,
    },
];

/// A parsed resource address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Favorites,
    Stats,
    Performer(String),
    Country(String),
    Ethnicity(String),
}

impl ResourceUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let unknown = || Error::not_found(format!("resource '{uri}'"));
        let path = uri.strip_prefix(SCHEME).ok_or_else(unknown)?;
        let segments: Vec<&str> = path.split('/').collect();
        let arg = |raw: &str| -> Result<String> {
            let decoded = percent_decode(raw)
                .ok_or_else(|| Error::validation(format!("malformed escape in '{uri}'")))?;
            let trimmed = decoded.trim();
            if trimmed.is_empty() {
                return Err(Error::validation(format!("empty argument in '{uri}'")));
            }
            Ok(trimmed.to_string())
        };
        match segments.as_slice() {
            ["performers", "favorites"] => Ok(Self::Favorites),
            ["performers", "stats"] => Ok(Self::Stats),
            ["performer", name] => Ok(Self::Performer(arg(name)?)),
            ["performers", "country", country] => Ok(Self::Country(arg(country)?)),
            ["performers", "ethnicity", ethnicity] => Ok(Self::Ethnicity(arg(ethnicity)?)),
            _ => Err(unknown()),
        }
    }
}

/// Decode `%XX` escapes; `None` on a truncated escape or invalid UTF-8.
fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            out.push(hex_value(hex[0]) << 4 | hex_value(hex[1]));
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

#[derive(Debug, Serialize)]
struct ListedPerformer<'a> {
    name: &'a str,
    country: Option<&'a str>,
    ethnicity: Option<&'a str>,
    height_cm: Option<i64>,
    weight: Option<i64>,
    tags: Vec<&'a str>,
}

impl<'a> From<&'a Performer> for ListedPerformer<'a> {
    fn from(p: &'a Performer) -> Self {
        Self {
            name: &p.name,
            country: p.country(),
            ethnicity: p.ethnicity(),
            height_cm: p.height(),
            weight: p.weight(),
            tags: p.tag_names().collect(),
        }
    }
}

fn listing(performers: &[Performer]) -> Value {
    let listed: Vec<ListedPerformer<'_>> = performers.iter().map(ListedPerformer::from).collect();
    json!({ "total": listed.len(), "performers": listed })
}

/// Read a resource document. Data comes from the cached catalogue.
pub async fn read(engine: &AnalysisEngine, uri: &str) -> Result<Value> {
    let catalog = engine.catalog();
    let document = match ResourceUri::parse(uri)? {
        ResourceUri::Favorites => listing(&catalog.favorite_performers().await?),
        ResourceUri::Stats => serde_json::to_value(engine.library_statistics().await?)?,
        ResourceUri::Performer(name) => {
            let performer = catalog
                .performer(&name)
                .await?
                .ok_or_else(|| Error::not_found(format!("performer '{name}'")))?;
            serde_json::to_value(ProfileSummary::from(performer.as_ref()))?
        }
        ResourceUri::Country(country) => {
            let filters = FilterSet::new()
                .favorites_only(true)
                .with(FilterCriterion::text_equals(FilterField::Country, country.as_str())?);
            let mut doc = listing(&catalog.performers(&filters).await?);
            doc["country"] = json!(country);
            doc
        }
        ResourceUri::Ethnicity(ethnicity) => {
            let filters = FilterSet::new()
                .favorites_only(true)
                .with(FilterCriterion::text_equals(FilterField::Ethnicity, ethnicity.as_str())?);
            let mut doc = listing(&catalog.performers(&filters).await?);
            doc["ethnicity"] = json!(ethnicity);
            doc
        }
    };

    let text = serde_json::to_string_pretty(&document)?;
    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": MIME_JSON,
            "text": text,
        }],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{engine, performer, FakeGateway};

    fn gateway() -> FakeGateway {
        FakeGateway {
            performers: vec![
                performer("1", "Ava", serde_json::json!({"favorite": true, "country": "USA", "tags": [{"id": "t1", "name": "Outdoor"}]})),
                performer("2", "Mia Rose", serde_json::json!({"favorite": true, "country": "Brazil", "ethnicity": "Latin"})),
                performer("3", "Kim", serde_json::json!({"favorite": false, "country": "USA"})),
            ],
            ..FakeGateway::default()
        }
    }

    fn document(value: &Value) -> Value {
        serde_json::from_str(value["contents"][0]["text"].as_str().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_uris() {
        assert_eq!(ResourceUri::parse("stash://performers/favorites").unwrap(), ResourceUri::Favorites);
        assert_eq!(
            ResourceUri::parse("stash://performer/Mia%20Rose").unwrap(),
            ResourceUri::Performer("Mia Rose".to_string())
        );
        assert_eq!(
            ResourceUri::parse("stash://performers/country/Brazil").unwrap(),
            ResourceUri::Country("Brazil".to_string())
        );
        assert_eq!(ResourceUri::parse("stash://scenes/all").unwrap_err().kind(), "not_found");
        assert_eq!(ResourceUri::parse("http://performers/stats").unwrap_err().kind(), "not_found");
        assert_eq!(ResourceUri::parse("stash://performer/%2").unwrap_err().kind(), "validation");
        assert_eq!(ResourceUri::parse("stash://performer/").unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_escape_requires_two_hex_digits() {
        assert_eq!(percent_decode("a%2bc%C3%A9").as_deref(), Some("a+cé"));
        assert_eq!(percent_decode("%+1"), None);
        assert_eq!(percent_decode("%-1x"), None);
        assert_eq!(percent_decode("%g0"), None);
        assert_eq!(ResourceUri::parse("stash://performer/%+1").unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_templates_match_parser() {
        for template in TEMPLATES {
            let uri = template
                .uri_template
                .replace("{name}", "x")
                .replace("{country}", "x")
                .replace("{ethnicity}", "x");
            assert!(ResourceUri::parse(&uri).is_ok(), "{uri}");
        }
        for resource in RESOURCES {
            assert!(ResourceUri::parse(resource.uri).is_ok());
        }
    }

    #[tokio::test]
    async fn test_read_favorites_and_country() {
        let (engine, _) = engine(gateway());
        let favorites = document(&read(&engine, "stash://performers/favorites").await.unwrap());
        assert_eq!(favorites["total"], 2);
        assert_eq!(favorites["performers"][0]["tags"], serde_json::json!(["Outdoor"]));

        let by_country = read(&engine, "stash://performers/country/USA").await.unwrap();
        assert_eq!(by_country["contents"][0]["mimeType"], "application/json");
        let doc = document(&by_country);
        assert_eq!(doc["total"], 1);
        assert_eq!(doc["country"], "USA");
        assert_eq!(doc["performers"][0]["name"], "Ava");
    }

    #[tokio::test]
    async fn test_read_performer_and_stats() {
        let (engine, _) = engine(gateway());
        let profile = document(&read(&engine, "stash://performer/mia%20rose").await.unwrap());
        assert_eq!(profile["name"], "Mia Rose");
        assert_eq!(profile["ethnicity"], "Latin");

        let stats = document(&read(&engine, "stash://performers/stats").await.unwrap());
        assert_eq!(stats["total_performers"], 2);

        let err = read(&engine, "stash://performer/Nobody").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
