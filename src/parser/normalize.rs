use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::extract::RawAttributes;
use super::labels;

static POSTAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{5}\b").unwrap());

/// Summaries longer than this are cut.
const SUMMARY_TRIGGER: usize = 100;
/// Characters kept from a cut summary.
const SUMMARY_KEEP: usize = 150;
const ELLIPSIS: &str = "...";

/// Fixed-shape organisation record as persisted.
///
/// List fields are never absent: an empty `Vec` is the empty-collection marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub name: Option<String>,
    pub summary: Option<String>,
    pub phone: Option<String>,
    pub company_size: Option<String>,
    pub locations: Option<String>,
    pub founding_year: Option<String>,
    pub sector: Vec<String>,
    pub website: Vec<String>,
    pub headquarters: Vec<String>,
    pub specialties: Vec<String>,
    pub postal_code: Option<String>,
    /// Filled in from the frontier row, never from the page.
    pub city: Option<String>,
}

impl NormalizedRecord {
    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }
}

/// Pure and total: missing inputs become missing or empty outputs.
pub fn normalize(raw: &RawAttributes) -> NormalizedRecord {
    let locations = raw.get(labels::LOCATIONS).unwrap_or_default();

    NormalizedRecord {
        name: raw.first(labels::NAME).map(str::to_string),
        summary: raw.first(labels::SUMMARY).map(truncate_summary),
        phone: raw.first(labels::PHONE).map(first_line),
        company_size: raw.first(labels::SIZE).map(str::to_string),
        locations: (!locations.is_empty()).then(|| locations.join(", ")),
        founding_year: raw.first(labels::FOUNDED).map(str::to_string),
        sector: list(raw, labels::SECTOR),
        website: list(raw, labels::WEBSITE),
        headquarters: list(raw, labels::HEADQUARTERS),
        specialties: list(raw, labels::SPECIALTIES),
        postal_code: postal_code(locations),
        city: None,
    }
}

/// Over 100 chars: keep the first 150 and mark the cut. The 100/150 asymmetry is intentional.
pub fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() > SUMMARY_TRIGGER {
        let kept: String = summary.chars().take(SUMMARY_KEEP).collect();
        format!("{kept}{ELLIPSIS}")
    } else {
        summary.to_string()
    }
}

/// Text before the first newline, whether escaped (`\n` as two chars) or literal.
pub fn first_line(phone: &str) -> String {
    let head = phone.split("\\n").next().unwrap_or_default();
    head.split('\n').next().unwrap_or_default().trim().to_string()
}

/// First 5-digit token, taking locations in order and the first match within each.
pub fn postal_code(locations: &[String]) -> Option<String> {
    locations
        .iter()
        .find_map(|loc| POSTAL_RE.find(loc))
        .map(|m| m.as_str().to_string())
}

fn list(raw: &RawAttributes, label: &str) -> Vec<String> {
    raw.get(label).map(<[String]>::to_vec).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &[&str])]) -> RawAttributes {
        let mut raw = RawAttributes::default();
        for (k, vs) in pairs {
            raw.insert(k, vs.iter().map(|v| v.to_string()).collect());
        }
        raw
    }

    #[test]
    fn summary_boundary_at_100() {
        let exact = "a".repeat(100);
        assert_eq!(truncate_summary(&exact), exact);

        let over = "b".repeat(101);
        let cut = truncate_summary(&over);
        assert!(cut.ends_with(ELLIPSIS));
        assert!(cut.chars().count() <= 153);
        assert_eq!(cut, format!("{}...", "b".repeat(101)));
    }

    #[test]
    fn long_summary_keeps_150_chars() {
        let long = "ñ".repeat(400);
        let cut = truncate_summary(&long);
        assert_eq!(cut.chars().count(), 153);
        assert!(cut.starts_with(&"ñ".repeat(150)));
    }

    #[test]
    fn phone_keeps_first_line() {
        assert_eq!(first_line("910 000 000\nNúmero de teléfono"), "910 000 000");
        assert_eq!(first_line(" 910 000 000 \\nverificado"), "910 000 000");
        assert_eq!(first_line("612345678"), "612345678");
    }

    #[test]
    fn postal_code_first_match_in_first_location() {
        let locs = vec![
            "Calle Falsa 123, 28013 Madrid".to_string(),
            "Otra Dir s/n".to_string(),
        ];
        assert_eq!(postal_code(&locs).as_deref(), Some("28013"));
        assert_eq!(postal_code(&["No digits here".to_string()]), None);
    }

    #[test]
    fn postal_code_skips_longer_digit_runs() {
        let locs = vec!["Tel 9100000001".to_string(), "Pol. Ind. 08940 Cornellà".to_string()];
        assert_eq!(postal_code(&locs).as_deref(), Some("08940"));
    }

    #[test]
    fn full_record() {
        let input = raw(&[
            (labels::NAME, &["Acme"]),
            (labels::SECTOR, &["Software"]),
            (labels::SUMMARY, &["Short summary"]),
            ("Sitio web", &["https://acme.es"]),
            ("Teléfono", &["910 000 000\nverificado"]),
            ("Tamaño de la empresa", &["11-50 empleados", "32 en LinkedIn"]),
            ("Año de fundación", &["1999"]),
            ("Especialidades", &["Yunques", "Martillos"]),
            (labels::LOCATIONS, &["Calle Falsa 123, 28013 Madrid", "Otra Dir s/n"]),
        ]);
        let rec = normalize(&input).with_city("Madrid");
        assert_eq!(rec.name.as_deref(), Some("Acme"));
        assert_eq!(rec.summary.as_deref(), Some("Short summary"));
        assert_eq!(rec.phone.as_deref(), Some("910 000 000"));
        assert_eq!(rec.company_size.as_deref(), Some("11-50 empleados"));
        assert_eq!(rec.founding_year.as_deref(), Some("1999"));
        assert_eq!(rec.sector, vec!["Software"]);
        assert_eq!(rec.website, vec!["https://acme.es"]);
        assert_eq!(rec.specialties, vec!["Yunques", "Martillos"]);
        assert!(rec.headquarters.is_empty());
        assert_eq!(
            rec.locations.as_deref(),
            Some("Calle Falsa 123, 28013 Madrid, Otra Dir s/n")
        );
        assert_eq!(rec.postal_code.as_deref(), Some("28013"));
        assert_eq!(rec.city.as_deref(), Some("Madrid"));
    }

    #[test]
    fn empty_input_gives_empty_markers() {
        let rec = normalize(&RawAttributes::default());
        assert_eq!(rec, NormalizedRecord::default());
        assert!(rec.sector.is_empty() && rec.website.is_empty());
    }

    #[test]
    fn empty_label_value_list_is_empty_marker() {
        let rec = normalize(&raw(&[("Sede", &[]), ("Teléfono", &[])]));
        assert!(rec.headquarters.is_empty());
        assert_eq!(rec.phone, None);
    }

    #[test]
    fn deterministic() {
        let summary = "x".repeat(120);
        let input = raw(&[(labels::SUMMARY, &[summary.as_str()]), ("Sede", &["Madrid"])]);
        assert_eq!(normalize(&input), normalize(&input));
    }
}
