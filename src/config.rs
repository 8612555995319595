use std::net::SocketAddr;
use std::path::PathBuf;

use h3o::Resolution;

use crate::normalize::ZeroCoordinatePolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// GeoJSON or record-array file loaded at startup.
    pub incidents_path: PathBuf,
    /// Default "near the route" distance.
    pub threshold_meters: f64,
    pub density_resolution: Resolution,
    pub zero_coordinates: ZeroCoordinatePolicy,
    pub log_level: String,
}

/// Reads `SAFEROUTE_*` variables, after loading a `.env` file if present.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is set to an unparsable value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    build_config(|key| std::env::var(key))
}

/// Core parsing, decoupled from the process environment for tests.
pub fn build_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let bind_addr = or_default("SAFEROUTE_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("SAFEROUTE_BIND_ADDR", e.to_string()))?;

    let incidents_path = PathBuf::from(or_default(
        "SAFEROUTE_INCIDENTS_PATH",
        "assets/crime_sample.geojson",
    ));

    let threshold_meters = or_default("SAFEROUTE_THRESHOLD_METERS", "200")
        .parse::<f64>()
        .map_err(|e| invalid("SAFEROUTE_THRESHOLD_METERS", e.to_string()))?;
    if !threshold_meters.is_finite() || threshold_meters < 0.0 {
        return Err(invalid(
            "SAFEROUTE_THRESHOLD_METERS",
            "must be a non-negative number".to_string(),
        ));
    }

    let density_resolution = or_default("SAFEROUTE_DENSITY_RESOLUTION", "9")
        .parse::<u8>()
        .map_err(|e| e.to_string())
        .and_then(|r| Resolution::try_from(r).map_err(|e| e.to_string()))
        .map_err(|reason| invalid("SAFEROUTE_DENSITY_RESOLUTION", reason))?;

    let zero_coordinates = match or_default("SAFEROUTE_ACCEPT_ZERO_COORDINATES", "false").as_str() {
        "true" | "1" => ZeroCoordinatePolicy::Accept,
        "false" | "0" => ZeroCoordinatePolicy::Reject,
        other => {
            return Err(invalid(
                "SAFEROUTE_ACCEPT_ZERO_COORDINATES",
                format!("expected true or false, got {other:?}"),
            ));
        }
    };

    let log_level = or_default("SAFEROUTE_LOG_LEVEL", "info");

    Ok(AppConfig {
        bind_addr,
        incidents_path,
        threshold_meters,
        density_resolution,
        zero_coordinates,
        log_level,
    })
}
