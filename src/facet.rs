use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::info;

use crate::error::{Result, ScrapeError};

/// City name used when a location code has no entry in the lookup.
pub const UNKNOWN_LOCATION: &str = "Desconocido";

/// Company headcount buckets understood by the search surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanySize {
    Tiny,
    Small,
    Medium,
    Large,
    XLarge,
    Enterprise,
    Huge,
    Giant,
}

impl CompanySize {
    pub const ALL: [CompanySize; 8] = [
        CompanySize::Tiny,
        CompanySize::Small,
        CompanySize::Medium,
        CompanySize::Large,
        CompanySize::XLarge,
        CompanySize::Enterprise,
        CompanySize::Huge,
        CompanySize::Giant,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CompanySize::Tiny => "1-10",
            CompanySize::Small => "11-50",
            CompanySize::Medium => "51-200",
            CompanySize::Large => "201-500",
            CompanySize::XLarge => "501-1000",
            CompanySize::Enterprise => "1001-5000",
            CompanySize::Huge => "5001-10000",
            CompanySize::Giant => "10000+",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            CompanySize::Tiny => "B",
            CompanySize::Small => "C",
            CompanySize::Medium => "D",
            CompanySize::Large => "E",
            CompanySize::XLarge => "F",
            CompanySize::Enterprise => "G",
            CompanySize::Huge => "H",
            CompanySize::Giant => "I",
        }
    }
}

impl FromStr for CompanySize {
    type Err = ScrapeError;

    /// Accepts either the bucket label ("51-200") or its code ("D").
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        CompanySize::ALL
            .into_iter()
            .find(|size| size.label() == s || size.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| ScrapeError::InvalidFacet(format!("unknown company size {s:?}")))
    }
}

/// Size filter value for the search URL. Blank input means "any size".
pub fn size_code(input: &str) -> Result<String> {
    if input.trim().is_empty() {
        return Ok(String::new());
    }
    Ok(input.parse::<CompanySize>()?.code().to_string())
}

/// Result pages to crawl per facet. Anything below 1 or past `u32::MAX` is rejected.
pub fn page_limit(pages: i64) -> Result<u32> {
    u32::try_from(pages)
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| {
            ScrapeError::InvalidFacet(format!(
                "page limit must be between 1 and {}, got {pages}",
                u32::MAX
            ))
        })
}

/// One slice of the faceted search space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FacetKey {
    location: String,
    industry: String,
    size_code: String,
}

impl FacetKey {
    pub fn new(location: &str, industry: &str, size_code: &str) -> Self {
        Self {
            location: location.trim().to_string(),
            industry: industry.trim().to_string(),
            size_code: size_code.to_string(),
        }
    }

    /// Substitute this facet and `page` into a search URL template.
    pub fn render_url(&self, template: &str, page: u32) -> String {
        template
            .replace("{location}", &self.location)
            .replace("{industry}", &self.industry)
            .replace("{company_size}", &self.size_code)
            .replace("{page}", &page.to_string())
    }
}

impl fmt::Display for FacetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "location={} industry={} size={}",
            self.location, self.industry, self.size_code
        )
    }
}

/// Locations × industries × sizes, in caller order.
#[derive(Debug, Clone)]
pub struct FacetGrid {
    pub locations: Vec<String>,
    pub industries: Vec<String>,
    /// Size codes, already mapped from labels.
    pub sizes: Vec<String>,
}

impl FacetGrid {
    /// Empty industry or size lists mean "no filter" and become a single blank value.
    pub fn new(locations: Vec<String>, industries: Vec<String>, sizes: Vec<String>) -> Result<Self> {
        let locations: Vec<String> = locations
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if locations.is_empty() {
            return Err(ScrapeError::InvalidFacet("at least one location is required".into()));
        }

        let industries = if industries.is_empty() {
            vec![String::new()]
        } else {
            industries
        };

        let sizes = if sizes.is_empty() {
            vec![String::new()]
        } else {
            sizes.iter().map(|s| size_code(s)).collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            locations,
            industries,
            sizes,
        })
    }

    pub fn len(&self) -> usize {
        self.locations.len() * self.industries.len() * self.sizes.len()
    }
}

/// Static location code → city name lookup, loaded once per process.
#[derive(Debug, Clone, Default)]
pub struct LocationNames {
    names: HashMap<String, String>,
}

impl LocationNames {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let names: HashMap<String, String> = serde_json::from_str(&raw)?;
        info!(path = %path.display(), count = names.len(), "Loaded location names");
        Ok(Self { names })
    }

    pub fn from_map(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    pub fn resolve(&self, code: &str) -> &str {
        self.names
            .get(code.trim())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LOCATION)
    }
}
