//! Subject catalog backing the selector.
//!
//! The core never looks inside a subject; it is handed to the report backend as-is.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub bio: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Subject {
    pub fn new(id: &str, name: &str, bio: &str, tags: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            bio: bio.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// First tag, used as the one-word caption in the sidebar.
    pub fn headline_tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct SubjectCatalog {
    subjects: Vec<Subject>,
}

impl SubjectCatalog {
    pub fn new(subjects: Vec<Subject>) -> Result<Self> {
        let mut ids = BTreeSet::new();
        for s in &subjects {
            if s.id.trim().is_empty() {
                bail!("subject '{}' has an empty id", s.name);
            }
            if !ids.insert(s.id.as_str()) {
                bail!("duplicate subject id '{}'", s.id);
            }
        }
        Ok(Self { subjects })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read subject catalog {}", path.display()))?;
        let subjects: Vec<Subject> = serde_json::from_str(&raw)
            .with_context(|| format!("parse subject catalog {}", path.display()))?;
        Self::new(subjects)
    }

    pub fn get(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.iter()
    }

    pub fn as_slice(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn builtin() -> Self {
        Self {
            subjects: vec![
                Subject::new(
                    "marcel-abraham",
                    "Marcel ABRAHAM",
                    "French intellectual of the early twentieth century, tied to educational and cultural networks.",
                    &["Education", "Culture", "France"],
                ),
                Subject::new(
                    "pierre-abraham",
                    "Pierre ABRAHAM",
                    "Marcel's brother; literary critic and a key figure of the intellectual resistance and French publishing.",
                    &["Literature", "Resistance", "Media"],
                ),
                Subject::new(
                    "louise-alcan",
                    "Louise ALCAN",
                    "Cultural promoter and publisher within the networks that spread European thought between the wars.",
                    &["Publishing", "Philosophy", "Networker"],
                ),
                Subject::new(
                    "jean-amery",
                    "Jean AMÉRY (Hans Mayer)",
                    "Born Hans Mayer. Austrian essayist, resistance fighter and Holocaust survivor whose work reflects on torture, resentment and victimhood.",
                    &["Philosophy", "Holocaust", "Existentialism"],
                ),
                Subject::new(
                    "henri-becker",
                    "Henri BECKER",
                    "Intellectual and activist linked to avant-garde social and artistic movements.",
                    &["Activism", "Avant-Garde"],
                ),
                Subject::new(
                    "paul-eluard",
                    "Paul ÉLUARD (Eugène Grindel)",
                    "French poet and co-founder of surrealism. His occupation-era poetry, \"Liberté\" above all, became a symbol of the resistance.",
                    &["Poetry", "Surrealism", "Resistance"],
                ),
                Subject::new(
                    "charles-feld",
                    "Charles FELD",
                    "Journalist and writer who documented Parisian cultural life and the political struggles of the twentieth century.",
                    &["Journalism", "History"],
                ),
                Subject::new(
                    "marie-emilie-reallon",
                    "Marie-Émilie RÉALLON",
                    "1863-1942. English teacher from Charente-Maritime, widowed in Corsica in 1914. Volunteer nurse for Corsican soldiers in Paris during the First World War and author of \"Nouvelles des Blessés Corses\". Died forgotten and poor in 1942.",
                    &["Humanitarian", "Corsica", "WWI", "Women History"],
                ),
                Subject::new(
                    "hans-hubert-von-ranke",
                    "Hans Hubert von RANKE",
                    "1902-1978. Bavarian nobleman, Lufthansa pioneer and covert KPD agent in the 1930s. Security chief of the International Brigades in Spain, broke with Stalinism in 1937, joined the Gaullist resistance in 1942 and worked as a journalist in Munich after the war.",
                    &["Espionage", "Spanish Civil War", "Resistance", "Anti-Fascist"],
                ),
                Subject::new(
                    "max-raphael",
                    "Max RAPHAEL",
                    "1889-1952. German-Jewish art historian who theorised expressionism and a Marxist sociology of art, taught workers in Berlin, went into exile in Paris and New York and wrote on Palaeolithic art.",
                    &["Art History", "Marxism", "Education", "Exile"],
                ),
                Subject::new(
                    "enrique-thomas-carranza",
                    "Enrique Thomas de CARRANZA",
                    "Francoist diplomat and politician: civil governor, ambassador and one of the founders of Alianza Popular. Embodies the continuity of the regime's elites during the Spanish transition.",
                    &["Politics", "Diplomacy", "Transition", "Right-Wing"],
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_unique_ids() {
        let catalog = SubjectCatalog::builtin();
        let rebuilt = SubjectCatalog::new(catalog.as_slice().to_vec()).unwrap();
        assert_eq!(rebuilt.len(), 11);
        assert_eq!(
            catalog.get("paul-eluard").map(|s| s.name.as_str()),
            Some("Paul ÉLUARD (Eugène Grindel)")
        );
        assert!(catalog.get("nobody").is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let s = Subject::new("a", "A", "bio", &[]);
        assert!(SubjectCatalog::new(vec![s.clone(), s]).is_err());
    }

    #[test]
    fn loads_catalog_without_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subjects.json");
        std::fs::write(&path, r#"[{"id": "x", "name": "X", "bio": "Someone."}]"#).unwrap();

        let catalog = SubjectCatalog::from_json_file(&path).unwrap();
        let x = catalog.get("x").unwrap();
        assert!(x.tags.is_empty());
        assert_eq!(x.headline_tag(), None);
    }
}
