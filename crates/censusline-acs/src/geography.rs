//! Geography levels, Census geography identifiers and page construction

use std::fmt;
use std::str::FromStr;

/// FIPS codes in 01..=56 that were never assigned to a state
const UNASSIGNED_FIPS: [u32; 5] = [3, 7, 14, 43, 52];

const ZCTA_COLUMN: &str = "zip code tabulation area";

/// Summary level a pipeline runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeographyLevel {
    Zcta,
    Tract,
}

impl GeographyLevel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Zcta => "zcta",
            Self::Tract => "tract",
        }
    }

    /// First ACS 5-year vintage publishing this level.
    pub fn first_year(self) -> u16 {
        match self {
            Self::Zcta => 2011,
            Self::Tract => 2009,
        }
    }

    pub fn supports_year(self, year: u16) -> bool {
        year >= self.first_year()
    }

    /// Geography columns the API appends to each row.
    pub fn geo_columns(self) -> &'static [&'static str] {
        match self {
            Self::Zcta => &[ZCTA_COLUMN],
            Self::Tract => &["state", "county", "tract"],
        }
    }

    /// Primary key column of the loaded table.
    pub fn key_column(self) -> &'static str {
        match self {
            Self::Zcta => "zcta",
            Self::Tract => "tract_fips",
        }
    }

    /// Key components written after the key column.
    pub fn part_columns(self) -> &'static [&'static str] {
        match self {
            Self::Zcta => &[],
            Self::Tract => &["state_fips", "county_fips", "tract_code"],
        }
    }

    /// Whether `column` is one the API adds for geography (for any level).
    pub fn is_geo_column(column: &str) -> bool {
        matches!(column, ZCTA_COLUMN | "state" | "county" | "tract")
    }
}

impl fmt::Display for GeographyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GeographyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zcta" => Ok(Self::Zcta),
            "tract" => Ok(Self::Tract),
            other => Err(format!("unknown geography level {other:?} (expected zcta or tract)")),
        }
    }
}

/// 50 states plus DC, as two-digit FIPS codes.
pub fn state_fips_codes() -> Vec<String> {
    (1..=56u32)
        .filter(|n| !UNASSIGNED_FIPS.contains(n))
        .map(|n| format!("{n:02}"))
        .collect()
}

/// Identifier of one geography unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeoId {
    Zcta {
        zcta: String,
    },
    Tract {
        state: String,
        county: String,
        tract: String,
    },
}

impl GeoId {
    /// 5-digit ZCTA, or 11-digit tract FIPS (state + county + tract).
    pub fn key(&self) -> String {
        match self {
            Self::Zcta { zcta } => zcta.clone(),
            Self::Tract {
                state,
                county,
                tract,
            } => format!("{state}{county}{tract}"),
        }
    }

    /// Values for [`GeographyLevel::part_columns`].
    pub fn parts(&self) -> Vec<&str> {
        match self {
            Self::Zcta { .. } => Vec::new(),
            Self::Tract {
                state,
                county,
                tract,
            } => vec![state.as_str(), county.as_str(), tract.as_str()],
        }
    }

    /// Build from the geography cells of an API row, in `level.geo_columns()` order.
    pub fn from_cells(level: GeographyLevel, cells: &[Option<&str>]) -> Result<Self, String> {
        let field = |i: usize, width: usize| -> Result<String, String> {
            let name = level.geo_columns()[i];
            match cells.get(i).copied().flatten() {
                Some(v) if v.len() == width && v.bytes().all(|b| b.is_ascii_digit()) => {
                    Ok(v.to_string())
                }
                Some(v) => Err(format!("malformed {name} {v:?}")),
                None => Err(format!("missing {name}")),
            }
        };
        Ok(match level {
            GeographyLevel::Zcta => Self::Zcta { zcta: field(0, 5)? },
            GeographyLevel::Tract => Self::Tract {
                state: field(0, 2)?,
                county: field(1, 3)?,
                tract: field(2, 6)?,
            },
        })
    }
}

impl fmt::Display for GeoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Geography predicate of one API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub for_clause: String,
    pub in_clause: Option<String>,
}

impl PageParams {
    pub fn new(for_clause: impl Into<String>, in_clause: Option<String>) -> Self {
        Self {
            for_clause: for_clause.into(),
            in_clause,
        }
    }

    pub fn query(&self) -> Vec<(String, String)> {
        let mut q = vec![("for".to_string(), self.for_clause.clone())];
        if let Some(in_clause) = &self.in_clause {
            q.push(("in".to_string(), in_clause.clone()));
        }
        q
    }

    /// One page per listed value, splitting the `in` clause list first and
    /// the `for` clause list otherwise. `None` if there is nothing to split.
    pub fn split(&self) -> Option<Vec<PageParams>> {
        if let Some((name, values)) = self.in_clause.as_deref().and_then(split_list) {
            return Some(
                values
                    .into_iter()
                    .map(|v| Self::new(self.for_clause.clone(), Some(format!("{name}:{v}"))))
                    .collect(),
            );
        }
        let (name, values) = split_list(&self.for_clause)?;
        Some(
            values
                .into_iter()
                .map(|v| Self::new(format!("{name}:{v}"), self.in_clause.clone()))
                .collect(),
        )
    }

    /// All tracts, `states_per_page` states per request.
    pub fn tract_pages(states_per_page: usize) -> Vec<PageParams> {
        state_fips_codes()
            .chunks(states_per_page.max(1))
            .map(|chunk| Self::new("tract:*", Some(format!("state:{}", chunk.join(",")))))
            .collect()
    }

    /// All ZCTAs in one request, or the listed ones `per_page` at a time.
    pub fn zcta_pages(zctas: &[String], per_page: usize) -> Vec<PageParams> {
        if zctas.is_empty() {
            return vec![Self::new(format!("{ZCTA_COLUMN}:*"), None)];
        }
        zctas
            .chunks(per_page.max(1))
            .map(|chunk| Self::new(format!("{ZCTA_COLUMN}:{}", chunk.join(",")), None))
            .collect()
    }

    pub fn for_level(
        level: GeographyLevel,
        states_per_page: usize,
        zctas: &[String],
        zctas_per_page: usize,
    ) -> Vec<PageParams> {
        match level {
            GeographyLevel::Zcta => Self::zcta_pages(zctas, zctas_per_page),
            GeographyLevel::Tract => Self::tract_pages(states_per_page),
        }
    }
}

impl fmt::Display for PageParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "for={}", self.for_clause)?;
        if let Some(in_clause) = &self.in_clause {
            write!(f, "&in={in_clause}")?;
        }
        Ok(())
    }
}

/// `"state:01,02"` → `("state", ["01", "02"])`, only for lists of 2+.
fn split_list(clause: &str) -> Option<(&str, Vec<&str>)> {
    let (name, list) = clause.rsplit_once(':')?;
    let values: Vec<&str> = list.split(',').map(str::trim).filter(|v| !v.is_empty()).collect();
    (values.len() > 1).then_some((name, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifty_states_plus_dc() {
        let states = state_fips_codes();
        assert_eq!(states.len(), 51);
        assert_eq!(states.first().map(String::as_str), Some("01"));
        assert_eq!(states.last().map(String::as_str), Some("56"));
        assert!(!states.iter().any(|s| s == "03" || s == "52"));
        assert!(states.iter().any(|s| s == "11"));
    }

    #[test]
    fn tract_pages_chunk_states() {
        let pages = PageParams::tract_pages(3);
        assert_eq!(pages.len(), 17);
        assert_eq!(pages[0].to_string(), "for=tract:*&in=state:01,02,04");
        let all: usize = pages.iter().map(|p| p.split().map_or(1, |s| s.len())).sum();
        assert_eq!(all, 51);
    }

    #[test]
    fn zcta_default_is_one_wildcard_page() {
        let pages = PageParams::zcta_pages(&[], 50);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].for_clause, "zip code tabulation area:*");
        assert!(pages[0].split().is_none());
    }

    #[test]
    fn zcta_list_chunks() {
        let zctas: Vec<String> = ["00601", "00602", "00603"].map(String::from).to_vec();
        let pages = PageParams::zcta_pages(&zctas, 2);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].for_clause, "zip code tabulation area:00601,00602");
        let split = pages[0].split().unwrap();
        assert_eq!(split[1].for_clause, "zip code tabulation area:00602");
    }

    #[test]
    fn split_in_clause_keeps_for() {
        let page = PageParams::new("tract:*", Some("state:06,08".into()));
        let parts = page.split().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].to_string(), "for=tract:*&in=state:08");
        assert!(parts[0].split().is_none());
    }

    #[test]
    fn query_pairs() {
        let page = PageParams::new("tract:*", Some("state:01".into()));
        assert_eq!(
            page.query(),
            vec![
                ("for".to_string(), "tract:*".to_string()),
                ("in".to_string(), "state:01".to_string())
            ]
        );
    }

    #[test]
    fn tract_key_is_eleven_digits() {
        let id = GeoId::from_cells(
            GeographyLevel::Tract,
            &[Some("01"), Some("001"), Some("020100")],
        )
        .unwrap();
        assert_eq!(id.key(), "01001020100");
        assert_eq!(id.parts(), vec!["01", "001", "020100"]);
    }

    #[test]
    fn malformed_geo_rejected() {
        assert!(GeoId::from_cells(GeographyLevel::Zcta, &[Some("601")]).is_err());
        assert!(GeoId::from_cells(GeographyLevel::Zcta, &[None]).is_err());
        assert!(
            GeoId::from_cells(GeographyLevel::Tract, &[Some("01"), Some("001")]).is_err()
        );
    }

    #[test]
    fn level_years() {
        assert!(GeographyLevel::Tract.supports_year(2009));
        assert!(!GeographyLevel::Zcta.supports_year(2010));
        assert_eq!("TRACT".parse::<GeographyLevel>(), Ok(GeographyLevel::Tract));
        assert!("county".parse::<GeographyLevel>().is_err());
    }
}
