use std::{env, error::Error, fs, path::Path};

use serde::Deserialize;

const CONFIG_FILE: &str = "cfg.toml";
const CONFIG_TEMPLATE: &str = "cfg.toml.example";

/// ThingSpeak accepts at most one update per channel every 15 seconds.
const MIN_INTERVAL_SECONDS: u16 = 15;

#[derive(Deserialize)]
struct RawConfig {
    wifi_ssid: String,
    wifi_psk: String,
    hostname: String,
    server: String,
    port: Option<u16>,
    api_key: String,
    tvoc_warning_ppb: u16,
    tvoc_danger_ppb: u16,
    co_warning_ppm: u16,
    co_danger_ppm: u16,
    measurement_interval_seconds: u16,
    tls_ca: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Tell Cargo to rerun if toml changes
    println!("cargo:rerun-if-changed={CONFIG_FILE}");
    println!("cargo:rerun-if-changed={CONFIG_TEMPLATE}");

    // Secrets live in an untracked cfg.toml, fall back to the template otherwise
    let path = if Path::new(CONFIG_FILE).exists() {
        CONFIG_FILE
    } else {
        println!("cargo:warning={CONFIG_FILE} not found, using {CONFIG_TEMPLATE}");
        CONFIG_TEMPLATE
    };

    let toml_str = fs::read_to_string(path)?;
    let raw: RawConfig = toml::from_str(&toml_str)?;

    validate(&raw)?;

    let default_port = if env::var_os("CARGO_FEATURE_TLS").is_some() {
        443
    } else {
        80
    };

    let code = format!(
        r#"
        pub const PROVISIONED: Settings = Settings {{
            wifi_ssid: {ssid:?},
            wifi_psk: {psk:?},
            hostname: {host:?},
            server: {server:?},
            port: {port},
            api_key: {key:?},
            thresholds: AirQualityThresholds {{
                tvoc: Thresholds {{ warning: {tw}, danger: {td} }},
                co: Thresholds {{ warning: {cw}, danger: {cd} }},
            }},
            measurement_interval_seconds: {intv},
            tls_ca: {ca:?},
        }};
    "#,
        ssid = raw.wifi_ssid,
        psk = raw.wifi_psk,
        host = raw.hostname,
        server = raw.server,
        port = raw.port.unwrap_or(default_port),
        key = raw.api_key,
        tw = raw.tvoc_warning_ppb,
        td = raw.tvoc_danger_ppb,
        cw = raw.co_warning_ppm,
        cd = raw.co_danger_ppm,
        intv = raw.measurement_interval_seconds,
        ca = raw.tls_ca,
    );

    let out_dir = env::var("OUT_DIR")?;
    let dest_path = Path::new(&out_dir).join("settings.rs");
    fs::write(dest_path, code)?;
    Ok(())
}

fn validate(raw: &RawConfig) -> Result<(), Box<dyn Error>> {
    if raw.tvoc_warning_ppb >= raw.tvoc_danger_ppb {
        return Err(format!(
            "tvoc_warning_ppb ({}) must be below tvoc_danger_ppb ({})",
            raw.tvoc_warning_ppb, raw.tvoc_danger_ppb
        )
        .into());
    }
    if raw.co_warning_ppm >= raw.co_danger_ppm {
        return Err(format!(
            "co_warning_ppm ({}) must be below co_danger_ppm ({})",
            raw.co_warning_ppm, raw.co_danger_ppm
        )
        .into());
    }
    if raw.measurement_interval_seconds < MIN_INTERVAL_SECONDS {
        return Err(format!(
            "measurement_interval_seconds must be at least {MIN_INTERVAL_SECONDS}"
        )
        .into());
    }
    Ok(())
}
