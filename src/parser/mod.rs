pub mod correlate;
pub mod extract;
pub mod normalize;

use crate::browser::Browser;
use extract::RawAttributes;
use normalize::NormalizedRecord;

/// Field keys as they appear on the detail page (plus the synthetic top-card keys).
pub mod labels {
    pub const NAME: &str = "Nombre de la empresa";
    pub const SUMMARY: &str = "Resumen";
    pub const SECTOR: &str = "Sector";
    pub const LOCATIONS: &str = "Ubicaciones";
    pub const PHONE: &str = "Teléfono";
    pub const SIZE: &str = "Tamaño de la empresa";
    pub const FOUNDED: &str = "Año de fundación";
    pub const WEBSITE: &str = "Sitio web";
    pub const HEADQUARTERS: &str = "Sede";
    pub const SPECIALTIES: &str = "Especialidades";
}

/// Two-step pipeline: loaded detail page → raw attributes → normalized record.
/// `None` when the page gave nothing usable.
pub async fn process_page(browser: &dyn Browser) -> Option<(RawAttributes, NormalizedRecord)> {
    let raw = extract::extract(browser).await;
    if raw.is_empty() {
        return None;
    }
    let record = normalize::normalize(&raw);
    Some((raw, record))
}
