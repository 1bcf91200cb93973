use serde::{Deserialize, Serialize};

use crate::transport::Endpoint;

/// GlobalSign RSA OV root used by api.weather.yandex.ru. Compiled in;
/// rotating the anchor requires a rebuild and reflash.
pub const YANDEX_ROOT_CA_PEM: &str = "-----BEGIN CERTIFICATE-----
MIIETjCCAzagAwIBAgINAe5fIh38YjvUMzqFVzANBgkqhkiG9w0BAQsFADBMMSAw
HgYDVQQLExdHbG9iYWxTaWduIFJvb3QgQ0EgLSBSMzETMBEGA1UEChMKR2xvYmFs
U2lnbjETMBEGA1UEAxMKR2xvYmFsU2lnbjAeFw0xODExMjEwMDAwMDBaFw0yODEx
MjEwMDAwMDBaMFAxCzAJBgNVBAYTAkJFMRkwFwYDVQQKExBHbG9iYWxTaWduIG52
LXNhMSYwJAYDVQQDEx1HbG9iYWxTaWduIFJTQSBPViBTU0wgQ0EgMjAxODCCASIw
DQYJKoZIhvcNAQEBBQADggEPADCCAQoCggEBAKdaydUMGCEAI9WXD+uu3Vxoa2uP
UGATeoHLl+6OimGUSyZ59gSnKvuk2la77qCk8HuKf1UfR5NhDW5xUTolJAgvjOH3
idaSz6+zpz8w7bXfIa7+9UQX/dhj2S/TgVprX9NHsKzyqzskeU8fxy7quRU6fBhM
abO1IFkJXinDY+YuRluqlJBJDrnw9UqhCS98NE3QvADFBlV5Bs6i0BDxSEPouVq1
lVW9MdIbPYa+oewNEtssmSStR8JvA+Z6cLVwzM0nLKWMjsIYPJLJLnNvBhBWk0Cq
o8VS++XFBdZpaFwGue5RieGKDkFNm5KQConpFmvv73W+eka440eKHRwup08CAwEA
AaOCASkwggElMA4GA1UdDwEB/wQEAwIBhjASBgNVHRMBAf8ECDAGAQH/AgEAMB0G
A1UdDgQWBBT473/yzXhnqN5vjySNiPGHAwKz6zAfBgNVHSMEGDAWgBSP8Et/qC5F
JK5NUPpjmove4t0bvDA+BggrBgEFBQcBAQQyMDAwLgYIKwYBBQUHMAGGImh0dHA6
Ly9vY3NwMi5nbG9iYWxzaWduLmNvbS9yb290cjMwNgYDVR0fBC8wLTAroCmgJ4Yl
aHR0cDovL2NybC5nbG9iYWxzaWduLmNvbS9yb290LXIzLmNybDBHBgNVHSAEQDA+
MDwGBFUdIAAwNDAyBggrBgEFBQcCARYmaHR0cHM6Ly93d3cuZ2xvYmFsc2lnbi5j
b20vcmVwb3NpdG9yeS8wDQYJKoZIhvcNAQELBQADggEBAJmQyC1fQorUC2bbmANz
EdSIhlIoU4r7rd/9c446ZwTbw1MUcBQJfMPg+NccmBqixD7b6QDjynCy8SIwIVbb
0615XoFYC20UgDX1b10d65pHBf9ZjQCxQNqQmJYaumxtf4z1s4DfjGRzNpZ5eWl0
6r/4ngGPoJVpjemEuunl1Ig423g7mNA2eymw0lIYkN5SQwCuaifIFJ6GlazhgDEw
fpolu4usBCOmmQDo8dIm7A9+O4orkjgTHY+GzYZSR+Y0fFukAj6KYXwidlNalFMz
hriSqHKvoflShx8xpfywgVcvzfTO3PYkz6fiNJBonf6q8amaEsybwMbDqKWwIX7e
SPY=
-----END CERTIFICATE-----
";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub api_key: String,
    pub rx_buf_size: usize,
    pub rx_timeout_s: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "api.weather.yandex.ru".to_string(),
            port: 443,
            path: "/v2/informers?lat=59.9386&lon=30.3141".to_string(),
            api_key: option_env!("YANDEX_API_KEY").unwrap_or("CHANGE_ME").to_string(),
            rx_buf_size: 1536,
            rx_timeout_s: 10,
        }
    }
}

impl ApiConfig {
    /// Renders the one fixed request this station ever sends. No body, no
    /// chunked transfer encoding on either side.
    pub fn request_bytes(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nX-Yandex-API-Key: {}\r\n\r\n",
            self.path, self.host, self.api_key
        )
        .into_bytes()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            ca_pem: YANDEX_ROOT_CA_PEM,
            timeout_s: self.rx_timeout_s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
    pub max_retries: u32,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string(),
            password: option_env!("WIFI_PASS").unwrap_or("CHANGE_ME").to_string(),
            max_retries: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub api: ApiConfig,
    pub wifi: WifiConfig,
    pub location_label: String,
    pub cooldown_ms: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            wifi: WifiConfig::default(),
            location_label: "Saint-Petersburg".to_string(),
            cooldown_ms: 5_000,
        }
    }
}

impl StationConfig {
    pub fn sanitize(&mut self) {
        self.api.rx_buf_size = self.api.rx_buf_size.clamp(512, 8_192);
        self.api.rx_timeout_s = self.api.rx_timeout_s.clamp(1, 120);
        self.wifi.max_retries = self.wifi.max_retries.clamp(1, 100);
        self.cooldown_ms = self.cooldown_ms.clamp(1_000, 3_600_000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_fixed_get_request() {
        let api = ApiConfig {
            host: "api.weather.yandex.ru".to_string(),
            port: 443,
            path: "/v2/informers?lat=59.9386&lon=30.3141".to_string(),
            api_key: "822a9b7c".to_string(),
            rx_buf_size: 1536,
            rx_timeout_s: 10,
        };

        let expected = "GET /v2/informers?lat=59.9386&lon=30.3141 HTTP/1.1\r\n\
                        Host: api.weather.yandex.ru\r\n\
                        X-Yandex-API-Key: 822a9b7c\r\n\
                        \r\n";
        assert_eq!(api.request_bytes(), expected.as_bytes());
    }

    #[test]
    fn sanitize_clamps_degenerate_values() {
        let mut config = StationConfig::default();
        config.api.rx_buf_size = 0;
        config.api.rx_timeout_s = 0;
        config.wifi.max_retries = 0;
        config.cooldown_ms = 0;

        config.sanitize();

        assert_eq!(config.api.rx_buf_size, 512);
        assert_eq!(config.api.rx_timeout_s, 1);
        assert_eq!(config.wifi.max_retries, 1);
        assert_eq!(config.cooldown_ms, 1_000);
    }

    #[test]
    fn config_survives_json_round_trip() {
        let config = StationConfig::default();
        let payload = serde_json::to_string(&config).unwrap();
        let restored: StationConfig = serde_json::from_str(&payload).unwrap();

        assert_eq!(restored.api.host, config.api.host);
        assert_eq!(restored.api.rx_buf_size, config.api.rx_buf_size);
        assert_eq!(restored.wifi.max_retries, config.wifi.max_retries);
        assert_eq!(restored.cooldown_ms, config.cooldown_ms);
    }

    #[test]
    fn endpoint_carries_the_pinned_anchor() {
        let endpoint = ApiConfig::default().endpoint();

        assert_eq!(endpoint.port, 443);
        assert!(endpoint.ca_pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(endpoint.ca_pem.ends_with("-----END CERTIFICATE-----\n"));
    }
}
