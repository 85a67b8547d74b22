//! Layer metadata: the editable buffer, its stable identity, and ISO XML
//! import/export
//!
//! Only the fields the publisher reads or writes are modelled; everything
//! else in a metadata document is ignored on import.

use crate::core::error::PublishError;
use crate::core::layer::Layer;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Keyword vocabulary holding ISO topic categories
pub const TOPIC_CATEGORY_VOCABULARY: &str = "gmd:topicCategory";

/// Vocabulary used for free keywords
pub const FREE_KEYWORD_VOCABULARY: &str = "keywords";

/// Point of contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organization: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
}

/// Descriptive metadata of a layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerMetadata {
    pub identifier: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Keywords grouped by vocabulary
    pub keywords: BTreeMap<String, Vec<String>>,
    pub contacts: Vec<Contact>,
    /// Fees / use constraints
    pub fees: String,
    pub licenses: Vec<String>,
    /// Access constraints
    pub constraints: Vec<String>,
    pub language: String,
}

impl LayerMetadata {
    pub fn topic_categories(&self) -> &[String] {
        self.keywords
            .get(TOPIC_CATEGORY_VOCABULARY)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every keyword of every vocabulary, topic categories included
    pub fn all_keywords(&self) -> Vec<&str> {
        self.keywords
            .values()
            .flat_map(|group| group.iter().map(String::as_str))
            .collect()
    }

    /// Render as an ISO 19139 document
    pub fn to_iso19139(&self, uuid: &str) -> String {
        let mut xml = String::new();
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(concat!(
            r#"<gmd:MD_Metadata xmlns:gmd="http://www.isotc211.org/2005/gmd" "#,
            r#"xmlns:gco="http://www.isotc211.org/2005/gco">"#,
            "\n"
        ));
        xml.push_str(&char_string("gmd:fileIdentifier", uuid));
        if !self.language.is_empty() {
            xml.push_str(&char_string("gmd:language", &self.language));
        }
        for contact in &self.contacts {
            xml.push_str("<gmd:contact><gmd:CI_ResponsibleParty>\n");
            xml.push_str(&char_string("gmd:individualName", &contact.name));
            if !contact.organization.is_empty() {
                xml.push_str(&char_string("gmd:organisationName", &contact.organization));
            }
            xml.push_str("</gmd:CI_ResponsibleParty></gmd:contact>\n");
        }
        xml.push_str("<gmd:identificationInfo><gmd:MD_DataIdentification>\n");
        xml.push_str("<gmd:citation><gmd:CI_Citation>\n");
        xml.push_str(&char_string("gmd:title", &self.title));
        xml.push_str("</gmd:CI_Citation></gmd:citation>\n");
        xml.push_str(&char_string("gmd:abstract", &self.abstract_text));
        for (vocabulary, words) in &self.keywords {
            if vocabulary == TOPIC_CATEGORY_VOCABULARY {
                continue;
            }
            xml.push_str("<gmd:descriptiveKeywords><gmd:MD_Keywords>\n");
            for word in words {
                xml.push_str(&char_string("gmd:keyword", word));
            }
            xml.push_str("</gmd:MD_Keywords></gmd:descriptiveKeywords>\n");
        }
        if !self.licenses.is_empty() || !self.fees.is_empty() || !self.constraints.is_empty() {
            xml.push_str("<gmd:resourceConstraints><gmd:MD_LegalConstraints>\n");
            for license in &self.licenses {
                xml.push_str(&char_string("gmd:useLimitation", license));
            }
            for constraint in &self.constraints {
                xml.push_str(&char_string("gmd:otherConstraints", constraint));
            }
            xml.push_str("</gmd:MD_LegalConstraints></gmd:resourceConstraints>\n");
        }
        for topic in self.topic_categories() {
            xml.push_str(&format!(
                "<gmd:topicCategory><gmd:MD_TopicCategoryCode>{}</gmd:MD_TopicCategoryCode></gmd:topicCategory>\n",
                escape_xml(topic)
            ));
        }
        xml.push_str("</gmd:MD_DataIdentification></gmd:identificationInfo>\n");
        if !self.fees.is_empty() {
            xml.push_str("<gmd:distributionInfo><gmd:MD_Distribution><gmd:distributor><gmd:MD_Distributor>");
            xml.push_str("<gmd:distributionOrderProcess><gmd:MD_StandardOrderProcess>\n");
            xml.push_str(&char_string("gmd:fees", &self.fees));
            xml.push_str("</gmd:MD_StandardOrderProcess></gmd:distributionOrderProcess>");
            xml.push_str("</gmd:MD_Distributor></gmd:distributor></gmd:MD_Distribution></gmd:distributionInfo>\n");
        }
        xml.push_str("</gmd:MD_Metadata>\n");
        xml
    }
}

fn char_string(tag: &str, value: &str) -> String {
    format!(
        "<{tag}><gco:CharacterString>{}</gco:CharacterString></{tag}>\n",
        escape_xml(value)
    )
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// Identity
// ============================================================================

/// Source of the stable UUID a layer's metadata record is stored under
pub trait MetadataIdentity: Send + Sync {
    fn uuid_for_layer(&self, layer: &Layer) -> String;
}

/// Uses the metadata identifier when it is a UUID, otherwise derives a
/// name-based (v5) UUID from the layer source and name
#[derive(Debug, Default, Clone, Copy)]
pub struct DeterministicIdentity;

impl MetadataIdentity for DeterministicIdentity {
    fn uuid_for_layer(&self, layer: &Layer) -> String {
        if let Ok(uuid) = Uuid::parse_str(layer.metadata.identifier.trim()) {
            return uuid.to_string();
        }
        let key = format!("{}#{}", layer.source, layer.name);
        Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
    }
}

// ============================================================================
// XML import
// ============================================================================

/// Reads metadata documents from disk
#[async_trait]
pub trait MetadataImporter: Send + Sync {
    async fn load_metadata_from_xml(&self, path: &Path) -> Result<LayerMetadata, PublishError>;
}

/// Importer for ISO 19139 and ESRI-ISO documents
#[derive(Debug, Default, Clone, Copy)]
pub struct IsoXmlImporter;

#[async_trait]
impl MetadataImporter for IsoXmlImporter {
    async fn load_metadata_from_xml(&self, path: &Path) -> Result<LayerMetadata, PublishError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PublishError::MetadataFormat {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        parse_metadata_xml(&content).ok_or_else(|| PublishError::MetadataFormat {
            path: path.display().to_string(),
            message: "not an ISO19139 or ESRI-ISO metadata document".to_string(),
        })
    }
}

lazy_static! {
    static ref ISO_ROOT: Regex = Regex::new(r"<(?:gmd:)?MD_Metadata[\s>]").unwrap();
    static ref ESRI_ROOT: Regex = Regex::new(r"(?s)<metadata[\s>].*<Esri>").unwrap();
    static ref ISO_IDENTIFIER: Regex = iso_string("fileIdentifier");
    static ref ISO_TITLE: Regex = iso_string("title");
    static ref ISO_ABSTRACT: Regex = iso_string("abstract");
    static ref ISO_KEYWORD: Regex = iso_string("keyword");
    static ref ISO_INDIVIDUAL: Regex = iso_string("individualName");
    static ref ISO_ORGANISATION: Regex = iso_string("organisationName");
    static ref ISO_FEES: Regex = iso_string("fees");
    static ref ISO_USE_LIMITATION: Regex = iso_string("useLimitation");
    static ref ISO_OTHER_CONSTRAINTS: Regex = iso_string("otherConstraints");
    static ref ISO_LANGUAGE_STRING: Regex = iso_string("language");
    static ref ISO_LANGUAGE_CODE: Regex =
        Regex::new(r#"<gmd:LanguageCode[^>]*codeListValue="([^"]*)""#).unwrap();
    static ref ISO_TOPIC: Regex =
        Regex::new(r"(?s)<gmd:MD_TopicCategoryCode>\s*(.*?)\s*</gmd:MD_TopicCategoryCode>").unwrap();
    static ref ESRI_TITLE: Regex = esri_element("resTitle");
    static ref ESRI_ABSTRACT: Regex = esri_element("idAbs");
    static ref ESRI_KEYWORD: Regex = esri_element("keyword");
    static ref ESRI_CONTACT: Regex = esri_element("rpIndName");
    static ref ESRI_ORGANISATION: Regex = esri_element("rpOrgName");
    static ref ESRI_USE_LIMIT: Regex = esri_element("useLimit");
    static ref ESRI_OTHER_CONSTRAINTS: Regex = esri_element("othConsts");
    static ref ESRI_LANGUAGE: Regex =
        Regex::new(r#"<languageCode[^>]*value="([^"]*)""#).unwrap();
}

fn iso_string(tag: &str) -> Regex {
    Regex::new(&format!(
        r"(?s)<gmd:{tag}>\s*<gco:CharacterString>(.*?)</gco:CharacterString>"
    ))
    .unwrap()
}

fn esri_element(tag: &str) -> Regex {
    Regex::new(&format!(r"(?s)<{tag}>(.*?)</{tag}>")).unwrap()
}

fn first(regex: &Regex, content: &str) -> Option<String> {
    regex
        .captures(content)
        .and_then(|cap| cap.get(1))
        .map(|m| unescape_xml(m.as_str().trim()))
}

fn all(regex: &Regex, content: &str) -> Vec<String> {
    regex
        .captures_iter(content)
        .filter_map(|cap| cap.get(1))
        .map(|m| unescape_xml(m.as_str().trim()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse an ISO 19139 or ESRI-ISO document, `None` if it is neither
pub fn parse_metadata_xml(content: &str) -> Option<LayerMetadata> {
    if ISO_ROOT.is_match(content) {
        Some(parse_iso(content))
    } else if ESRI_ROOT.is_match(content) {
        Some(parse_esri(content))
    } else {
        None
    }
}

fn parse_iso(content: &str) -> LayerMetadata {
    let mut keywords = BTreeMap::new();
    let free = all(&ISO_KEYWORD, content);
    if !free.is_empty() {
        keywords.insert(FREE_KEYWORD_VOCABULARY.to_string(), free);
    }
    let topics = all(&ISO_TOPIC, content);
    if !topics.is_empty() {
        keywords.insert(TOPIC_CATEGORY_VOCABULARY.to_string(), topics);
    }

    let organisations = all(&ISO_ORGANISATION, content);
    let contacts = all(&ISO_INDIVIDUAL, content)
        .into_iter()
        .enumerate()
        .map(|(i, name)| Contact {
            name,
            organization: organisations.get(i).cloned().unwrap_or_default(),
            ..Default::default()
        })
        .collect();

    LayerMetadata {
        identifier: first(&ISO_IDENTIFIER, content).unwrap_or_default(),
        title: first(&ISO_TITLE, content).unwrap_or_default(),
        abstract_text: first(&ISO_ABSTRACT, content).unwrap_or_default(),
        keywords,
        contacts,
        fees: first(&ISO_FEES, content).unwrap_or_default(),
        licenses: all(&ISO_USE_LIMITATION, content),
        constraints: all(&ISO_OTHER_CONSTRAINTS, content),
        language: first(&ISO_LANGUAGE_CODE, content)
            .or_else(|| first(&ISO_LANGUAGE_STRING, content))
            .unwrap_or_default(),
    }
}

fn parse_esri(content: &str) -> LayerMetadata {
    let mut keywords = BTreeMap::new();
    let free = all(&ESRI_KEYWORD, content);
    if !free.is_empty() {
        keywords.insert(FREE_KEYWORD_VOCABULARY.to_string(), free);
    }

    let organisations = all(&ESRI_ORGANISATION, content);
    let contacts = all(&ESRI_CONTACT, content)
        .into_iter()
        .enumerate()
        .map(|(i, name)| Contact {
            name,
            organization: organisations.get(i).cloned().unwrap_or_default(),
            ..Default::default()
        })
        .collect();

    LayerMetadata {
        title: first(&ESRI_TITLE, content).unwrap_or_default(),
        abstract_text: first(&ESRI_ABSTRACT, content).unwrap_or_default(),
        keywords,
        contacts,
        licenses: all(&ESRI_USE_LIMIT, content),
        constraints: all(&ESRI_OTHER_CONSTRAINTS, content),
        language: first(&ESRI_LANGUAGE, content).unwrap_or_default(),
        ..Default::default()
    }
}

/// Metadata file stored next to a layer source: `<source stem>.xml`, then
/// `<source>.xml`
pub async fn locate_metadata_file(source: &str) -> Option<PathBuf> {
    let source_path = Path::new(source);
    let candidates = [
        source_path.with_extension("xml"),
        PathBuf::from(format!("{}.xml", source)),
    ];

    for candidate in candidates {
        if fs::metadata(&candidate).await.is_ok() {
            return Some(candidate);
        }
    }
    None
}
