//! High-level control of devices and groups behind a Trådfri gateway.
//!
//! Every operation translates a human-level intent into the gateway's
//! resource path and numeric-property payload, issues one CoAP call over the
//! DTLS session and parses the typed response. Devices and groups are
//! ephemeral snapshots: nothing is cached, state is mutated by PUTting and
//! re-fetched on demand.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::coap::client::CoapClient;
use crate::coap::{CoapMessage, Method, ResourcePath};
use crate::dtls::DtlsSession;
use crate::error::{Error, Result};
use crate::util::color::{hex_to_rgb, map_range, rgb_to_hsl};
use crate::util::traits::Transport;

/// Transition time used when the caller does not ask for one, in
/// milliseconds. The wire value is this divided by 100 (gateway time units).
pub const DEFAULT_TRANSITION_TIME_MS: u32 = 500;

/// Static description of a device, the `"3"` object in device JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "0", default)]
    pub manufacturer: String,
    #[serde(rename = "1", default)]
    pub model: String,
    #[serde(rename = "3", default)]
    pub firmware: String,
    #[serde(rename = "6", default)]
    pub power_source: u8,
}

/// One light-control entry (`"3311"`). Bulbs report exactly one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LightSetting {
    /// Power state, 0 or 1.
    #[serde(rename = "5850", skip_serializing_if = "Option::is_none")]
    pub power: Option<u8>,
    /// Dimmer level, 0-255.
    #[serde(rename = "5851", skip_serializing_if = "Option::is_none")]
    pub dimmer: Option<u8>,
    /// Color as a hex string, e.g. `"efd275"`.
    #[serde(rename = "5706", skip_serializing_if = "Option::is_none")]
    pub color_hex: Option<String>,
    #[serde(rename = "5707", skip_serializing_if = "Option::is_none")]
    pub hue: Option<u32>,
    #[serde(rename = "5708", skip_serializing_if = "Option::is_none")]
    pub saturation: Option<u32>,
    /// CIE 1931 x coordinate.
    #[serde(rename = "5709", skip_serializing_if = "Option::is_none")]
    pub color_x: Option<u32>,
    /// CIE 1931 y coordinate.
    #[serde(rename = "5710", skip_serializing_if = "Option::is_none")]
    pub color_y: Option<u32>,
    #[serde(rename = "5711", skip_serializing_if = "Option::is_none")]
    pub color_temperature: Option<u32>,
    /// Transition time in gateway units (ms / 100).
    #[serde(rename = "5712", skip_serializing_if = "Option::is_none")]
    pub transition_time: Option<u32>,
}

/// One blind-control entry (`"15015"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlindSetting {
    /// Position in percent, 0-100.
    #[serde(rename = "5536", skip_serializing_if = "Option::is_none")]
    pub position: Option<f32>,
}

/// Read-only projection of one device's gateway state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "9003")]
    pub id: u32,
    #[serde(rename = "9001", default)]
    pub name: String,
    #[serde(rename = "9002", default)]
    pub created_at: u64,
    #[serde(rename = "9020", default)]
    pub last_seen: u64,
    #[serde(rename = "9019", default)]
    pub reachable: u8,
    #[serde(rename = "5750", default)]
    pub device_type: u32,
    #[serde(rename = "3", default, skip_serializing_if = "Option::is_none")]
    pub info: Option<DeviceInfo>,
    #[serde(rename = "3311", default, skip_serializing_if = "Vec::is_empty")]
    pub light_control: Vec<LightSetting>,
    #[serde(rename = "15015", default, skip_serializing_if = "Vec::is_empty")]
    pub blind_control: Vec<BlindSetting>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceLinks {
    #[serde(rename = "9003", default)]
    pub ids: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupContent {
    #[serde(rename = "15002", default)]
    pub links: DeviceLinks,
}

/// A group of devices and its shared state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "9003")]
    pub id: u32,
    #[serde(rename = "9001", default)]
    pub name: String,
    #[serde(rename = "5850", default)]
    pub power: u8,
    #[serde(rename = "5851", default)]
    pub dimmer: u8,
    #[serde(rename = "9018", default)]
    pub content: GroupContent,
}

impl Group {
    /// Member device ids in the order the gateway reports them.
    pub fn member_ids(&self) -> &[u32] {
        &self.content.links.ids
    }
}

/// The credential issued by the gateway's PSK exchange. Consumed by the
/// caller right away; nothing here is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenExchange {
    /// The pre-shared key to use for future sessions.
    #[serde(rename = "9091")]
    pub token: String,
    #[serde(rename = "9029", default)]
    pub firmware_version: String,
}

/// Normalized result of a mutation: the response status code as text,
/// e.g. `"2.04"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericResponse {
    pub code: String,
}

/// A declarative API for one gateway, generic over the transport so tests
/// can swap the DTLS session for a stub.
pub struct TradfriClient<T: Transport> {
    coap: CoapClient<T>,
}

impl TradfriClient<DtlsSession> {
    /// Connects a DTLS session to `gateway` and wraps it in a client.
    pub async fn connect(
        gateway: &str,
        identity: &str,
        psk: &[u8],
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let session = DtlsSession::connect(gateway, identity, psk, handshake_timeout).await?;
        Ok(TradfriClient::new(session))
    }
}

impl<T: Transport> TradfriClient<T> {
    pub fn new(transport: T) -> Self {
        TradfriClient {
            coap: CoapClient::new(transport),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.coap = self.coap.with_read_timeout(read_timeout);
        self
    }

    /// Performs the first-time PSK exchange: submits `client_id` to the
    /// authentication resource and returns the issued credential.
    ///
    /// The session this runs over must have been established with the
    /// gateway's built-in identity and security code; the returned token is
    /// the PSK for sessions under `client_id`.
    pub async fn authenticate(&mut self, client_id: &str) -> Result<TokenExchange> {
        let payload = json!({ "9090": client_id }).to_string();
        let response = self
            .coap
            .call(Method::Post, ResourcePath::auth(), payload.into_bytes())
            .await?;
        let token: TokenExchange = serde_json::from_slice(&response.payload)?;
        Ok(token)
    }

    /// Switches the device on (1) or off (0).
    ///
    /// Anything but 0 or 1 is unambiguously meaningless, so it is rejected
    /// before any bytes are written.
    pub async fn set_power(&mut self, device_id: u32, power: u8) -> Result<GenericResponse> {
        validate_power(power)?;
        self.put_device(device_id, json!({ "3311": [{ "5850": power }] }))
            .await
    }

    /// Sets the dimmer level (0-255). The device must support dimming,
    /// otherwise the call is ineffectual.
    pub async fn set_dimming(&mut self, device_id: u32, dimming: u8) -> Result<GenericResponse> {
        self.put_device(device_id, json!({ "3311": [{ "5851": dimming }] }))
            .await
    }

    /// Changes power and dimmer with a single PUT.
    pub async fn set_state(
        &mut self,
        device_id: u32,
        power: u8,
        dimmer: u8,
    ) -> Result<GenericResponse> {
        validate_power(power)?;
        self.put_device(device_id, json!({ "3311": [{ "5850": power, "5851": dimmer }] }))
            .await
    }

    /// Sets the CIE 1931 x/y color (0-65536 each) with the default
    /// transition. Many combinations are not supported by the gateway; the
    /// values pass through unvalidated.
    pub async fn set_color_xy(&mut self, device_id: u32, x: u32, y: u32) -> Result<GenericResponse> {
        self.set_color_xy_timed(device_id, x, y, DEFAULT_TRANSITION_TIME_MS)
            .await
    }

    /// Same as [`Self::set_color_xy`] with an explicit transition time in
    /// milliseconds.
    pub async fn set_color_xy_timed(
        &mut self,
        device_id: u32,
        x: u32,
        y: u32,
        transition_time_ms: u32,
    ) -> Result<GenericResponse> {
        self.put_device(
            device_id,
            json!({ "3311": [{ "5709": x, "5710": y, "5712": transition_time_ms / 100 }] }),
        )
        .await
    }

    /// Sets the color from a 6-hex-digit RGB string such as `"8f2686"`.
    ///
    /// The value is converted to HSL before sending; the gateway's own RGB
    /// hex property does not work reliably.
    pub async fn set_color_rgb(&mut self, device_id: u32, rgb: &str) -> Result<GenericResponse> {
        self.set_color_rgb_timed(device_id, rgb, DEFAULT_TRANSITION_TIME_MS)
            .await
    }

    /// Same as [`Self::set_color_rgb`] with an explicit transition time.
    pub async fn set_color_rgb_timed(
        &mut self,
        device_id: u32,
        rgb: &str,
        transition_time_ms: u32,
    ) -> Result<GenericResponse> {
        let (r, g, b) = hex_to_rgb(rgb)?;
        self.set_color_rgb_components_timed(device_id, r, g, b, transition_time_ms)
            .await
    }

    /// Sets the color from raw RGB components.
    pub async fn set_color_rgb_components(
        &mut self,
        device_id: u32,
        r: u8,
        g: u8,
        b: u8,
    ) -> Result<GenericResponse> {
        self.set_color_rgb_components_timed(device_id, r, g, b, DEFAULT_TRANSITION_TIME_MS)
            .await
    }

    /// Same as [`Self::set_color_rgb_components`] with an explicit
    /// transition time.
    pub async fn set_color_rgb_components_timed(
        &mut self,
        device_id: u32,
        r: u8,
        g: u8,
        b: u8,
        transition_time_ms: u32,
    ) -> Result<GenericResponse> {
        let (h, s, l) = rgb_to_hsl(r, g, b);
        self.set_color_hsl_timed(device_id, h, s, l, transition_time_ms)
            .await
    }

    /// Sets the color in HSL notation: hue in degrees `[0, 360)`,
    /// saturation and lightness in percent `[0, 100]`.
    ///
    /// HSL is preferable over RGB here because RGB is always at full
    /// brightness (`"000000"` behaves like `"ffffff"`).
    pub async fn set_color_hsl(
        &mut self,
        device_id: u32,
        hue: f64,
        saturation: f64,
        lightness: f64,
    ) -> Result<GenericResponse> {
        self.set_color_hsl_timed(device_id, hue, saturation, lightness, DEFAULT_TRANSITION_TIME_MS)
            .await
    }

    /// Same as [`Self::set_color_hsl`] with an explicit transition time.
    /// The values are remapped to the gateway's integer ranges and
    /// truncated.
    pub async fn set_color_hsl_timed(
        &mut self,
        device_id: u32,
        hue: f64,
        saturation: f64,
        lightness: f64,
        transition_time_ms: u32,
    ) -> Result<GenericResponse> {
        let hue = map_range(hue, 0.0, 360.0, 0.0, 65279.0) as u32;
        let saturation = map_range(saturation, 0.0, 100.0, 0.0, 65279.0) as u32;
        let lightness = map_range(lightness, 0.0, 100.0, 0.0, 254.0) as u32;

        self.put_device(
            device_id,
            json!({ "3311": [{
                "5707": hue,
                "5708": saturation,
                "5851": lightness,
                "5712": transition_time_ms / 100,
            }] }),
        )
        .await
    }

    /// Sets a blind's position, 0-100.
    pub async fn set_positioning(
        &mut self,
        device_id: u32,
        positioning: f32,
    ) -> Result<GenericResponse> {
        self.put(
            ResourcePath::blind(device_id),
            json!({ "15015": [{ "5536": positioning }] }),
        )
        .await
    }

    /// Fetches one device.
    pub async fn get_device(&mut self, device_id: u32) -> Result<Device> {
        let response = self
            .coap
            .call(Method::Get, ResourcePath::device(device_id), Vec::new())
            .await?;
        Ok(serde_json::from_slice(&response.payload)?)
    }

    /// Lists the ids of all paired devices.
    pub async fn list_device_ids(&mut self) -> Result<Vec<u32>> {
        let response = self
            .coap
            .call(Method::Get, ResourcePath::device_index(), Vec::new())
            .await?;
        Ok(serde_json::from_slice(&response.payload)?)
    }

    /// Fetches every paired device, one round trip per device, in the order
    /// of the id listing.
    pub async fn list_devices(&mut self) -> Result<Vec<Device>> {
        let ids = self.list_device_ids().await?;
        let mut devices = Vec::with_capacity(ids.len());
        for id in ids {
            devices.push(self.get_device(id).await?);
        }
        Ok(devices)
    }

    /// Fetches one group.
    pub async fn get_group(&mut self, group_id: u32) -> Result<Group> {
        let response = self
            .coap
            .call(Method::Get, ResourcePath::group(group_id), Vec::new())
            .await?;
        Ok(serde_json::from_slice(&response.payload)?)
    }

    /// Lists the ids of all groups.
    pub async fn list_group_ids(&mut self) -> Result<Vec<u32>> {
        let response = self
            .coap
            .call(Method::Get, ResourcePath::group_index(), Vec::new())
            .await?;
        Ok(serde_json::from_slice(&response.payload)?)
    }

    /// Fetches every group, in the order of the id listing.
    pub async fn list_groups(&mut self) -> Result<Vec<Group>> {
        let ids = self.list_group_ids().await?;
        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            groups.push(self.get_group(id).await?);
        }
        Ok(groups)
    }

    /// GETs an arbitrary resource path. Escape hatch for resources the typed
    /// API does not cover.
    pub async fn get_raw(&mut self, path: &str) -> Result<CoapMessage> {
        self.coap.call(Method::Get, path.parse()?, Vec::new()).await
    }

    /// PUTs a raw payload to an arbitrary resource path.
    pub async fn put_raw(&mut self, path: &str, payload: &str) -> Result<CoapMessage> {
        self.coap
            .call(Method::Put, path.parse()?, payload.as_bytes().to_vec())
            .await
    }

    async fn put_device(
        &mut self,
        device_id: u32,
        payload: serde_json::Value,
    ) -> Result<GenericResponse> {
        self.put(ResourcePath::device(device_id), payload).await
    }

    async fn put(
        &mut self,
        path: ResourcePath,
        payload: serde_json::Value,
    ) -> Result<GenericResponse> {
        let body = payload.to_string();
        debug!("payload for {} is {}", path, body);
        let response = self.coap.call(Method::Put, path, body.into_bytes()).await?;
        Ok(GenericResponse {
            code: response.code_string(),
        })
    }
}

fn validate_power(power: u8) -> Result<()> {
    if power > 1 {
        return Err(Error::Validation(format!(
            "power state must be 0 or 1, got {}",
            power
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::traits::stub::StubTransport;

    const CHANGED: u8 = 0x44; // 2.04

    fn client_with(stub: StubTransport) -> TradfriClient<StubTransport> {
        TradfriClient::new(stub)
    }

    #[tokio::test]
    async fn get_device_addresses_the_device_path_and_parses_fields() {
        let mut stub = StubTransport::new();
        stub.enqueue_content(
            r#"{"9001":"Bedroom bulb","9003":65536,"9019":1,"5750":2,
                "3":{"0":"IKEA of Sweden","1":"TRADFRI bulb E27","3":"1.2.217"},
                "3311":[{"5850":1,"5851":200,"5706":"efd275"}]}"#,
        );
        let mut client = client_with(stub);

        let device = client.get_device(65536).await.unwrap();

        let requests = &client.coap.transport().requests;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path.to_string(), "/15001/65536");
        assert_eq!(requests[0].code, Method::Get.code());

        assert_eq!(device.id, 65536);
        assert_eq!(device.name, "Bedroom bulb");
        assert_eq!(device.device_type, 2);
        assert_eq!(device.info.as_ref().unwrap().manufacturer, "IKEA of Sweden");
        let light = &device.light_control[0];
        assert_eq!(light.power, Some(1));
        assert_eq!(light.dimmer, Some(200));
        assert_eq!(light.color_hex.as_deref(), Some("efd275"));
    }

    #[tokio::test]
    async fn list_groups_issues_one_index_fetch_plus_one_per_group() {
        let mut stub = StubTransport::new();
        stub.enqueue_content("[1,2]");
        stub.enqueue_content(r#"{"9003":1,"9001":"Hall","9018":{"15002":{"9003":[65536]}}}"#);
        stub.enqueue_content(r#"{"9003":2,"9001":"Porch","9018":{"15002":{"9003":[65537,65538]}}}"#);
        let mut client = client_with(stub);

        let groups = client.list_groups().await.unwrap();

        let requests = &client.coap.transport().requests;
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].path.to_string(), "/15004");
        assert_eq!(requests[1].path.to_string(), "/15004/1");
        assert_eq!(requests[2].path.to_string(), "/15004/2");

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, 1);
        assert_eq!(groups[1].id, 2);
        assert_eq!(groups[1].member_ids(), [65537, 65538]);
    }

    #[tokio::test]
    async fn invalid_power_is_rejected_without_touching_the_transport() {
        let mut client = client_with(StubTransport::new());

        let err = client.set_power(1, 2).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(client.coap.transport().requests.is_empty());

        let err = client.set_state(1, 7, 100).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(client.coap.transport().requests.is_empty());
    }

    #[tokio::test]
    async fn set_power_puts_the_exact_payload() {
        let mut stub = StubTransport::new();
        stub.enqueue(CHANGED, b"");
        let mut client = client_with(stub);

        let response = client.set_power(65536, 1).await.unwrap();
        assert_eq!(response.code, "2.04");

        let request = &client.coap.transport().requests[0];
        assert_eq!(request.path.to_string(), "/15001/65536");
        assert_eq!(request.code, Method::Put.code());
        assert_eq!(request.payload, br#"{"3311":[{"5850":1}]}"#);
    }

    #[tokio::test]
    async fn set_state_carries_both_properties() {
        let mut stub = StubTransport::new();
        stub.enqueue(CHANGED, b"");
        let mut client = client_with(stub);

        client.set_state(1, 0, 127).await.unwrap();
        let request = &client.coap.transport().requests[0];
        assert_eq!(request.payload, br#"{"3311":[{"5850":0,"5851":127}]}"#);
    }

    #[tokio::test]
    async fn color_hsl_is_remapped_to_gateway_units() {
        let mut stub = StubTransport::new();
        stub.enqueue(CHANGED, b"");
        let mut client = client_with(stub);

        // Hue 360 and saturation 100 hit the top of the gateway range,
        // lightness 100 tops out at 254; 500 ms becomes 5 gateway units.
        client.set_color_hsl(1, 360.0, 100.0, 100.0).await.unwrap();
        let request = &client.coap.transport().requests[0];
        assert_eq!(
            request.payload,
            br#"{"3311":[{"5707":65279,"5708":65279,"5712":5,"5851":254}]}"#
        );
    }

    #[tokio::test]
    async fn color_rgb_goes_through_the_hsl_path() {
        let mut stub = StubTransport::new();
        stub.enqueue(CHANGED, b"");
        let mut client = client_with(stub);

        client.set_color_rgb(1, "8f2686").await.unwrap();
        let request = &client.coap.transport().requests[0];
        let body: serde_json::Value = serde_json::from_slice(&request.payload).unwrap();
        let setting = &body["3311"][0];
        // rgb_to_hsl(143, 38, 134) ≈ (305.14°, 58.01%, 35.49%), remapped.
        assert_eq!(setting["5707"], 55331);
        assert_eq!(setting["5708"], 37869);
        assert_eq!(setting["5851"], 90);
        assert_eq!(setting["5712"], 5);
    }

    #[tokio::test]
    async fn malformed_rgb_string_never_reaches_the_wire() {
        let mut client = client_with(StubTransport::new());
        let err = client.set_color_rgb(1, "zz0000").await.unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
        assert!(client.coap.transport().requests.is_empty());
    }

    #[tokio::test]
    async fn color_xy_passes_coordinates_through() {
        let mut stub = StubTransport::new();
        stub.enqueue(CHANGED, b"");
        let mut client = client_with(stub);

        client.set_color_xy_timed(9, 30138, 26909, 1000).await.unwrap();
        let request = &client.coap.transport().requests[0];
        assert_eq!(
            request.payload,
            br#"{"3311":[{"5709":30138,"5710":26909,"5712":10}]}"#
        );
    }

    #[tokio::test]
    async fn positioning_puts_to_the_blind_path() {
        let mut stub = StubTransport::new();
        stub.enqueue(CHANGED, b"");
        let mut client = client_with(stub);

        client.set_positioning(77, 75.0).await.unwrap();
        let request = &client.coap.transport().requests[0];
        assert_eq!(request.path.to_string(), "/15015/77");
        assert_eq!(request.payload, br#"{"15015":[{"5536":75.0}]}"#);
    }

    #[tokio::test]
    async fn authenticate_posts_the_client_id_and_parses_the_token() {
        let mut stub = StubTransport::new();
        stub.enqueue(0x41, br#"{"9091":"newpsk1234567890","9029":"1.4.15"}"#); // 2.01
        let mut client = client_with(stub);

        let exchange = client.authenticate("my-client").await.unwrap();
        assert_eq!(exchange.token, "newpsk1234567890");
        assert_eq!(exchange.firmware_version, "1.4.15");

        let request = &client.coap.transport().requests[0];
        assert_eq!(request.code, Method::Post.code());
        assert_eq!(request.path.to_string(), "/15011/9063");
        assert_eq!(request.payload, br#"{"9090":"my-client"}"#);
    }

    #[tokio::test]
    async fn garbage_json_surfaces_as_a_json_error() {
        let mut stub = StubTransport::new();
        stub.enqueue_content("not json");
        let mut client = client_with(stub);
        let err = client.list_device_ids().await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
