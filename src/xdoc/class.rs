//! Coarse entity classes used to keep distinct entities that share a name apart.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identifier::local_name;

/// Coarse (ACE-style) entity class derived from an ontology type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityClass {
    Per,
    Org,
    Gpe,
    Loc,
    Fac,
    Wea,
    Veh,
    Other,
}

const KEYWORDS: &[(EntityClass, &[&str])] = &[
    (EntityClass::Other, &["title", "position"]),
    (
        EntityClass::Per,
        &["person", "people", "player", "athlete", "politician", "author"],
    ),
    (
        EntityClass::Org,
        &["organization", "organisation", "company", "team", "agency", "party", "league", "group"],
    ),
    (
        EntityClass::Gpe,
        &["gpe", "country", "nation", "city", "state", "province", "town", "village"],
    ),
    (
        EntityClass::Loc,
        &["location", "region", "continent", "water", "mountain"],
    ),
    (
        EntityClass::Fac,
        &["facility", "building", "airport", "stadium"],
    ),
    (EntityClass::Wea, &["weapon"]),
    (EntityClass::Veh, &["vehicle"]),
];

impl EntityClass {
    /// Parse an ACE label (`PER`, `ORG`, `GPE`, `LOC`, `FAC`, `WEA`, `VEH`).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "PER" => Some(Self::Per),
            "ORG" => Some(Self::Org),
            "GPE" => Some(Self::Gpe),
            "LOC" => Some(Self::Loc),
            "FAC" => Some(Self::Fac),
            "WEA" => Some(Self::Wea),
            "VEH" => Some(Self::Veh),
            _ => None,
        }
    }

    /// Classify an ontology type (`ic:Person`, `kbp:GPE-spec`) or ACE label.
    pub fn from_type(type_uri: &str) -> Self {
        let local = local_name(type_uri);
        if let Some(class) = Self::from_label(local) {
            return class;
        }
        let lower = local.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(class, _)| *class)
            .unwrap_or(Self::Other)
    }

    /// Same class, or the GPE/location pair that routinely share names.
    pub fn is_compatible(self, other: EntityClass) -> bool {
        self == other
            || matches!(
                (self, other),
                (Self::Gpe, Self::Loc) | (Self::Loc, Self::Gpe)
            )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Per => "PER",
            Self::Org => "ORG",
            Self::Gpe => "GPE",
            Self::Loc => "LOC",
            Self::Fac => "FAC",
            Self::Wea => "WEA",
            Self::Veh => "VEH",
            Self::Other => "NONE",
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ace_labels_parse_case_insensitively() {
        assert_eq!(EntityClass::from_label("gpe"), Some(EntityClass::Gpe));
        assert_eq!(EntityClass::from_label("NONE"), None);
    }

    #[test]
    fn ontology_types_map_by_local_name() {
        assert_eq!(EntityClass::from_type("ic:Person"), EntityClass::Per);
        assert_eq!(EntityClass::from_type("Person"), EntityClass::Per);
        assert_eq!(EntityClass::from_type("kbp:GPE-spec"), EntityClass::Gpe);
        assert_eq!(EntityClass::from_type("nfl:NFLTeam"), EntityClass::Org);
        assert_eq!(EntityClass::from_type("Country"), EntityClass::Gpe);
        assert_eq!(
            EntityClass::from_type("kbp:HeadOfNationStateTitle"),
            EntityClass::Other
        );
        assert_eq!(EntityClass::from_type("xsd:string"), EntityClass::Other);
    }

    #[test]
    fn gpe_and_location_are_compatible() {
        assert!(EntityClass::Gpe.is_compatible(EntityClass::Loc));
        assert!(!EntityClass::Gpe.is_compatible(EntityClass::Org));
        assert!(!EntityClass::Per.is_compatible(EntityClass::Gpe));
    }
}
