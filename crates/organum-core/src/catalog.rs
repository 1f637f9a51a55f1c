//! Registration catalog: divisions, ranks, stops and their couplings.
//!
//! The catalog is built once from an [`OrganConfig`] and is immutable
//! afterwards. Every other component holds it behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::OrganConfig;
use crate::error::CatalogError;

/// Largest coupling transpose, in semitones either way.
pub const MAX_TRANSPOSE: i32 = 127;

/// A keyboard or pedalboard group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Division {
    Great,
    Swell,
    Choir,
    Pedal,
}

impl Division {
    /// All divisions, in lookup order.
    pub const ALL: [Division; 4] = [
        Division::Great,
        Division::Swell,
        Division::Choir,
        Division::Pedal,
    ];

    /// Lowercase name, as used in configuration and qualified stop ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Division::Great => "great",
            Division::Swell => "swell",
            Division::Choir => "choir",
            Division::Pedal => "pedal",
        }
    }

    /// Single-letter code (`G`, `S`, `C`, `P`).
    pub fn code(&self) -> char {
        match self {
            Division::Great => 'G',
            Division::Swell => 'S',
            Division::Choir => 'C',
            Division::Pedal => 'P',
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Division {
    type Err = String;

    /// Accepts full names and single-letter codes, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "great" | "g" => Ok(Division::Great),
            "swell" | "s" => Ok(Division::Swell),
            "choir" | "c" => Ok(Division::Choir),
            "pedal" | "p" => Ok(Division::Pedal),
            _ => Err(format!("unknown division '{}'", s.trim())),
        }
    }
}

/// Identity of a stop: the division it belongs to and its upper-cased name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StopId {
    pub division: Division,
    pub name: String,
}

impl StopId {
    pub fn new(division: Division, name: impl AsRef<str>) -> Self {
        Self {
            division,
            name: name.as_ref().trim().to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.division, self.name)
    }
}

/// Where a rank's notes are sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OutputAddress {
    pub output: String,
    pub channel: u8,
}

impl OutputAddress {
    /// Split a device address into its `client:port` part and channel.
    ///
    /// The address is `"<device-label> <client>:<port>:<channel>"`. The label
    /// may itself contain spaces and colons; only the last whitespace-separated
    /// token is interpreted.
    pub fn parse(address: &str) -> Result<(String, u8), CatalogError> {
        let invalid = || CatalogError::InvalidAddress(address.to_string());

        let token = address.split_whitespace().last().ok_or_else(invalid)?;
        let mut parts = token.split(':');
        let (client, port, channel) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(p), Some(ch), None) => (c, p, ch),
            _ => return Err(invalid()),
        };
        client.parse::<u32>().map_err(|_| invalid())?;
        port.parse::<u32>().map_err(|_| invalid())?;
        let channel: u8 = channel.parse().map_err(|_| invalid())?;
        if channel > 15 {
            return Err(invalid());
        }
        Ok((format!("{}:{}", client, port), channel))
    }

    /// Resolve an address against the configured outputs (`client:port` → output name).
    pub fn resolve(
        address: &str,
        outputs: &HashMap<String, String>,
    ) -> Result<OutputAddress, CatalogError> {
        let (client_port, channel) = Self::parse(address)?;
        let output = outputs
            .get(&client_port)
            .ok_or(CatalogError::UnknownOutput(client_port))?;
        Ok(OutputAddress {
            output: output.clone(),
            channel,
        })
    }
}

impl fmt::Display for OutputAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ch{}", self.output, self.channel)
    }
}

/// A set of pipes (or a virtual voice) addressed as one output channel.
#[derive(Debug, Clone, Serialize)]
pub struct Rank {
    pub id: String,
    pub name: String,
    /// Rank-native note number sounding middle C.
    pub pitch_reference: Option<u8>,
    pub first_note: Option<u8>,
    pub last_note: Option<u8>,
    /// `None` when the configured address could not be resolved.
    pub output: Option<OutputAddress>,
}

/// A stop's coupling to one rank.
#[derive(Debug, Clone, Serialize)]
pub struct Coupling {
    pub rank: String,
    pub transpose: i32,
    pub velocity_min: u8,
    pub velocity_max: u8,
}

impl Coupling {
    /// Clamp an input velocity into this coupling's bounds.
    pub fn velocity(&self, input: u8) -> u8 {
        input.clamp(self.velocity_min, self.velocity_max)
    }
}

/// A registration switch coupling a division to one or more ranks.
#[derive(Debug, Clone, Serialize)]
pub struct Stop {
    pub id: StopId,
    pub display_name: String,
    pub couplings: Vec<Coupling>,
}

/// The immutable registration catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    ranks: HashMap<String, Rank>,
    stops: Vec<Stop>,
    index: HashMap<StopId, usize>,
    by_name: HashMap<String, usize>,
    outputs: Vec<String>,
}

impl Catalog {
    /// Build and validate the catalog from a parsed configuration.
    pub fn from_config(config: &OrganConfig) -> Result<Self, CatalogError> {
        let mut client_ports = HashMap::new();
        let mut outputs = Vec::new();
        for output in &config.outputs {
            client_ports.insert(output.client_port.trim().to_string(), output.name.clone());
            if !outputs.contains(&output.name) {
                outputs.push(output.name.clone());
            }
        }

        let mut ranks = HashMap::new();
        for settings in &config.ranks {
            if ranks.contains_key(&settings.id) {
                return Err(CatalogError::DuplicateRank(settings.id.clone()));
            }
            if let (Some(first), Some(last)) = (settings.first_note, settings.last_note) {
                if first > last {
                    return Err(CatalogError::InvalidNoteRange {
                        rank: settings.id.clone(),
                        first,
                        last,
                    });
                }
            }
            let output = match OutputAddress::resolve(&settings.address, &client_ports) {
                Ok(addr) => Some(addr),
                Err(e) => {
                    log::warn!("Rank '{}' has no output, its notes will be dropped: {}", settings.id, e);
                    None
                }
            };
            ranks.insert(
                settings.id.clone(),
                Rank {
                    id: settings.id.clone(),
                    name: settings.name.clone().unwrap_or_else(|| settings.id.clone()),
                    pitch_reference: settings.pitch_reference,
                    first_note: settings.first_note,
                    last_note: settings.last_note,
                    output,
                },
            );
        }

        let mut stops = Vec::with_capacity(config.stops.len());
        let mut index = HashMap::new();
        for settings in &config.stops {
            let id = StopId::new(settings.division, &settings.id);
            if index.contains_key(&id) {
                return Err(CatalogError::DuplicateStop {
                    division: settings.division,
                    stop: id.name,
                });
            }
            let mut couplings = Vec::with_capacity(settings.ranks.len());
            for c in &settings.ranks {
                if c.velocity_min > c.velocity_max || c.velocity_max > 127 {
                    return Err(CatalogError::InvalidVelocityBounds {
                        stop: id.name.clone(),
                        rank: c.rank.clone(),
                        min: c.velocity_min,
                        max: c.velocity_max,
                    });
                }
                if !(-MAX_TRANSPOSE..=MAX_TRANSPOSE).contains(&c.transpose) {
                    return Err(CatalogError::InvalidTranspose {
                        stop: id.name.clone(),
                        rank: c.rank.clone(),
                        transpose: c.transpose,
                    });
                }
                couplings.push(Coupling {
                    rank: c.rank.clone(),
                    transpose: c.transpose,
                    velocity_min: c.velocity_min,
                    velocity_max: c.velocity_max,
                });
            }
            index.insert(id.clone(), stops.len());
            stops.push(Stop {
                display_name: settings.name.clone().unwrap_or_else(|| id.name.clone()),
                id,
                couplings,
            });
        }

        let mut by_name = HashMap::new();
        for division in Division::ALL {
            for (ordinal, stop) in stops.iter().enumerate() {
                if stop.id.division == division {
                    by_name.entry(stop.id.name.clone()).or_insert(ordinal);
                }
            }
        }

        log::debug!(
            "Catalog built: {} ranks, {} stops, {} outputs",
            ranks.len(),
            stops.len(),
            outputs.len()
        );

        Ok(Self {
            ranks,
            stops,
            index,
            by_name,
            outputs,
        })
    }

    /// Resolve a stop id, bare (`PRINCIPAL_8`) or qualified (`great:PRINCIPAL_8`).
    ///
    /// Bare ids are searched in division order, so a name shared between
    /// divisions resolves to the earliest one.
    pub fn resolve(&self, id: &str) -> Option<&Stop> {
        let id = id.trim();
        if let Some((division, name)) = id.split_once(':') {
            let division = division.parse::<Division>().ok()?;
            return self.get(&StopId::new(division, name));
        }
        self.by_name
            .get(&id.to_ascii_uppercase())
            .map(|&ordinal| &self.stops[ordinal])
    }

    pub fn get(&self, id: &StopId) -> Option<&Stop> {
        self.index.get(id).map(|&ordinal| &self.stops[ordinal])
    }

    /// Position of a stop in declaration order.
    pub fn ordinal(&self, id: &StopId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// All stops in declaration order.
    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn rank(&self, id: &str) -> Option<&Rank> {
        self.ranks.get(id)
    }

    pub fn rank_count(&self) -> usize {
        self.ranks.len()
    }

    /// Configured output names, in declaration order.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrganConfig;

    const CONFIG: &str = r#"
        [[outputs]]
        name = "pipes"
        client_port = "20:2"

        [[ranks]]
        id = "R1"
        name = "Open Diapason"
        pitch_reference = 60
        first_note = 36
        last_note = 96
        address = "U6MIDI Pro:U6MIDI Pro MIDI 3 20:2:0"

        [[ranks]]
        id = "R2"
        pitch_reference = 48
        address = "Nowhere 99:0:1"

        [[stops]]
        division = "swell"
        id = "Principal_8"
        ranks = [{ rank = "R1" }]

        [[stops]]
        division = "great"
        id = "PRINCIPAL_8"
        name = "Principal 8'"
        ranks = [{ rank = "R1", transpose = 12, velocity_min = 20, velocity_max = 100 }]

        [[stops]]
        division = "great"
        id = "BOURDON_16"
        ranks = [{ rank = "R2", transpose = -12 }]
    "#;

    fn catalog() -> Catalog {
        Catalog::from_config(&OrganConfig::from_toml_str(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn test_division_parsing() {
        assert_eq!("great".parse::<Division>(), Ok(Division::Great));
        assert_eq!("S".parse::<Division>(), Ok(Division::Swell));
        assert_eq!(" Choir ".parse::<Division>(), Ok(Division::Choir));
        assert_eq!("p".parse::<Division>(), Ok(Division::Pedal));
        assert!("X".parse::<Division>().is_err());
        assert!("".parse::<Division>().is_err());
        assert_eq!(Division::Pedal.code(), 'P');
        assert_eq!(Division::Swell.to_string(), "swell");
    }

    #[test]
    fn test_address_parsing() {
        assert_eq!(
            OutputAddress::parse("U6MIDI Pro:U6MIDI Pro MIDI 3 20:2:5").unwrap(),
            ("20:2".to_string(), 5)
        );
        assert_eq!(OutputAddress::parse("128:0:15").unwrap(), ("128:0".to_string(), 15));
        assert!(OutputAddress::parse("label 20:2:16").is_err());
        assert!(OutputAddress::parse("label 20:2").is_err());
        assert!(OutputAddress::parse("label a:b:c").is_err());
        assert!(OutputAddress::parse("").is_err());
    }

    #[test]
    fn test_ranks_resolved() {
        let catalog = catalog();
        assert_eq!(catalog.rank_count(), 2);
        let r1 = catalog.rank("R1").unwrap();
        assert_eq!(
            r1.output,
            Some(OutputAddress {
                output: "pipes".to_string(),
                channel: 0
            })
        );
        assert_eq!(r1.name, "Open Diapason");
        // Unknown client:port keeps the rank but without an output.
        let r2 = catalog.rank("R2").unwrap();
        assert!(r2.output.is_none());
        assert_eq!(r2.name, "R2");
    }

    #[test]
    fn test_stop_lookup() {
        let catalog = catalog();
        // Bare ids search Great before Swell even though Swell was declared first.
        let stop = catalog.resolve("principal_8").unwrap();
        assert_eq!(stop.id, StopId::new(Division::Great, "PRINCIPAL_8"));
        assert_eq!(stop.display_name, "Principal 8'");

        let stop = catalog.resolve("swell:principal_8").unwrap();
        assert_eq!(stop.id.division, Division::Swell);
        assert_eq!(stop.display_name, "PRINCIPAL_8");

        assert!(catalog.resolve("choir:principal_8").is_none());
        assert!(catalog.resolve("nowhere:principal_8").is_none());
        assert!(catalog.resolve("TRUMPET_8").is_none());
    }

    #[test]
    fn test_declaration_order() {
        let catalog = catalog();
        let names: Vec<_> = catalog.stops().iter().map(|s| s.id.to_string()).collect();
        assert_eq!(names, vec!["swell:PRINCIPAL_8", "great:PRINCIPAL_8", "great:BOURDON_16"]);

        assert_eq!(catalog.ordinal(&StopId::new(Division::Great, "bourdon_16")), Some(2));
    }

    #[test]
    fn test_coupling_defaults_and_clamp() {
        let catalog = catalog();
        let swell = catalog.resolve("swell:PRINCIPAL_8").unwrap();
        assert_eq!(swell.couplings[0].transpose, 0);
        assert_eq!(swell.couplings[0].velocity(0), 1);
        assert_eq!(swell.couplings[0].velocity(127), 127);

        let great = catalog.resolve("great:PRINCIPAL_8").unwrap();
        assert_eq!(great.couplings[0].velocity(10), 20);
        assert_eq!(great.couplings[0].velocity(127), 100);
        assert_eq!(great.couplings[0].velocity(64), 64);
    }

    #[test]
    fn test_duplicate_rank_rejected() {
        let config = OrganConfig::from_toml_str(
            r#"
            [[ranks]]
            id = "R1"
            [[ranks]]
            id = "R1"
            "#,
        )
        .unwrap();
        assert_eq!(
            Catalog::from_config(&config).unwrap_err(),
            CatalogError::DuplicateRank("R1".to_string())
        );
    }

    #[test]
    fn test_duplicate_stop_rejected() {
        let config = OrganConfig::from_toml_str(
            r#"
            [[stops]]
            division = "great"
            id = "FLUTE_4"
            [[stops]]
            division = "great"
            id = "flute_4"
            "#,
        )
        .unwrap();
        assert!(matches!(
            Catalog::from_config(&config),
            Err(CatalogError::DuplicateStop { division: Division::Great, .. })
        ));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let config = OrganConfig::from_toml_str(
            r#"
            [[stops]]
            division = "pedal"
            id = "SUBBASS_16"
            ranks = [{ rank = "R1", velocity_min = 90, velocity_max = 80 }]
            "#,
        )
        .unwrap();
        assert!(matches!(
            Catalog::from_config(&config),
            Err(CatalogError::InvalidVelocityBounds { min: 90, max: 80, .. })
        ));

        let config = OrganConfig::from_toml_str(
            r#"
            [[ranks]]
            id = "R1"
            first_note = 96
            last_note = 36
            "#,
        )
        .unwrap();
        assert!(matches!(
            Catalog::from_config(&config),
            Err(CatalogError::InvalidNoteRange { first: 96, last: 36, .. })
        ));
    }

    #[test]
    fn test_transpose_bounded() {
        let stop = |transpose: i64| {
            OrganConfig::from_toml_str(&format!(
                r#"
                [[stops]]
                division = "great"
                id = "MIXTURE"
                ranks = [{{ rank = "R1", transpose = {} }}]
                "#,
                transpose
            ))
            .unwrap()
        };
        assert!(Catalog::from_config(&stop(127)).is_ok());
        assert!(Catalog::from_config(&stop(-127)).is_ok());
        assert_eq!(
            Catalog::from_config(&stop(2_147_483_647)).unwrap_err(),
            CatalogError::InvalidTranspose {
                stop: "MIXTURE".to_string(),
                rank: "R1".to_string(),
                transpose: i32::MAX,
            }
        );
        assert!(matches!(
            Catalog::from_config(&stop(-128)),
            Err(CatalogError::InvalidTranspose { transpose: -128, .. })
        ));
    }
}
