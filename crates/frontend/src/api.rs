use agrimap_core::view::lon_lat_to_mercator;
use agrimap_core::{Coordinate, FieldRecord};

fn api_url(path: &str) -> Option<String> {
    let origin = web_sys::window()?.location().origin().ok()?;
    Some(join_url(&origin, path))
}

/// Join an origin and an absolute API path without doubling the slash.
pub fn join_url(origin: &str, path: &str) -> String {
    format!(
        "{}/{}",
        origin.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub async fn fetch_fields(path: &str) -> Result<Vec<FieldRecord>, String> {
    let url = api_url(path).ok_or_else(|| "No browser location".to_string())?;

    let resp = reqwest::Client::new()
        .get(url)
        .header("Content-Type", "application/json")
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !resp.status().is_success() {
        return Err(format!("HTTP error! status: {}", resp.status()));
    }

    resp.json().await.map_err(|e| e.to_string())
}

/// Load the field list, falling back to the demo set when the API is
/// unreachable.
pub async fn load_fields(path: &str) -> Vec<FieldRecord> {
    match fetch_fields(path).await {
        Ok(fields) => fields,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load fields from the API");
            demo_fields()
        }
    }
}

/// A rectangle `width_deg` by `height_deg` anchored at its south-west corner.
fn demo_boundary(lon: f64, lat: f64, width_deg: f64, height_deg: f64) -> Vec<Coordinate> {
    vec![
        lon_lat_to_mercator(lon, lat),
        lon_lat_to_mercator(lon + width_deg, lat),
        lon_lat_to_mercator(lon + width_deg, lat + height_deg),
        lon_lat_to_mercator(lon, lat + height_deg),
        lon_lat_to_mercator(lon, lat),
    ]
}

pub fn demo_fields() -> Vec<FieldRecord> {
    let field = |id: i64, name: &str, area: f64, crop: &str, origin: (f64, f64)| FieldRecord {
        id,
        name: name.to_string(),
        crop: crop.to_string(),
        area,
        coordinates: demo_boundary(origin.0, origin.1, 0.01, 0.004),
    };
    vec![
        field(1, "Field No. 1", 45.2, "Winter wheat", (37.52, 55.70)),
        field(2, "Field No. 2", 32.7, "Corn", (37.54, 55.70)),
        field(3, "Field No. 3", 28.5, "Sunflower", (37.56, 55.70)),
        field(4, "North field", 56.3, "Barley", (37.52, 55.72)),
        field(5, "South field", 41.8, "Rapeseed", (37.54, 55.68)),
        field(6, "West field", 37.4, "Soy", (37.50, 55.70)),
    ]
}

/// Format hectares for the field list and forms.
pub fn format_hectares(hectares: f64) -> String {
    format!("{:.2} ha", hectares)
}
