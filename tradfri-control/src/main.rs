use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use tradfri_control_lib::control_interface::TradfriClient;
use tradfri_control_lib::dtls::DtlsSession;

/// Identity the gateway accepts for the first-time key exchange, together
/// with the security code printed on its underside.
const FACTORY_IDENTITY: &str = "Client_identity";

/// How long the DTLS handshake may take before the connection attempt is
/// abandoned.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "tradfri-control",
    about = "Controls IKEA Trådfri lighting gateways",
    version
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

/// Supported output formats for listing commands.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Plain text format.
    Plaintext,
    /// JSON format.
    Json,
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Performs the first-time key exchange against a factory gateway.
    ///
    /// Connects with the gateway's built-in identity and the security code
    /// printed on the gateway, and asks it to issue a pre-shared key for
    /// your own client identity. Save the printed key; the gateway will not
    /// show it again.
    #[clap(name = "authenticate")]
    Authenticate {
        /// Gateway address, e.g. 192.168.0.15
        #[clap(long, env = "TRADFRI_GATEWAY")]
        gateway: String,

        /// Gateway CoAP/DTLS port
        #[clap(long, env = "TRADFRI_PORT", default_value_t = 5684)]
        port: u16,

        /// The security code printed on the gateway
        #[clap(long, env = "TRADFRI_SECURITY_CODE")]
        security_code: String,

        /// The client identity to register
        client_id: String,
    },
    /// Subcommand for operations against an already-paired gateway
    #[clap(name = "gateway")]
    Gateway {
        /// Gateway address, e.g. 192.168.0.15
        #[clap(long, env = "TRADFRI_GATEWAY")]
        gateway: String,

        /// Gateway CoAP/DTLS port
        #[clap(long, env = "TRADFRI_PORT", default_value_t = 5684)]
        port: u16,

        /// Client identity registered with `authenticate`
        #[clap(long, env = "TRADFRI_IDENTITY")]
        identity: String,

        /// Pre-shared key issued by `authenticate`
        #[clap(long, env = "TRADFRI_PSK")]
        psk: String,

        #[clap(subcommand)]
        action: GatewayAction,
    },
}

/// Actions available under the `gateway` subcommand
#[derive(Subcommand)]
pub enum GatewayAction {
    /// Lists all paired devices.
    #[clap(name = "list-devices")]
    ListDevices {
        /// Output format (plaintext, json)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,
    },
    /// Lists the ids of all paired devices.
    #[clap(name = "list-device-ids")]
    ListDeviceIds,
    /// Fetches a single device.
    #[clap(name = "get-device")]
    GetDevice {
        /// The device id
        id: u32,
    },
    /// Lists all groups.
    #[clap(name = "list-groups")]
    ListGroups {
        /// Output format (plaintext, json)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,
    },
    /// Fetches a single group.
    #[clap(name = "get-group")]
    GetGroup {
        /// The group id
        id: u32,
    },
    /// Switches a device on or off.
    #[clap(name = "set-power")]
    SetPower {
        /// The device id
        id: u32,

        /// Power state: 1 for on, 0 for off
        power: u8,
    },
    /// Sets a device's dimmer level.
    #[clap(name = "set-dimmer")]
    SetDimmer {
        /// The device id
        id: u32,

        /// Dimmer level (0-255)
        level: u8,
    },
    /// Sets power and dimmer with one command.
    #[clap(name = "set-state")]
    SetState {
        /// The device id
        id: u32,

        /// Power state: 1 for on, 0 for off
        power: u8,

        /// Dimmer level (0-255)
        level: u8,
    },
    /// Sets a device's color from an RGB hex string such as 8f2686.
    #[clap(name = "set-color-rgb")]
    SetColorRgb {
        /// The device id
        id: u32,

        /// 6-hex-digit RGB value, no separators
        rgb: String,

        /// Transition time in milliseconds
        #[clap(long, default_value_t = 500)]
        transition_ms: u32,
    },
    /// Sets a device's color in HSL notation.
    #[clap(name = "set-color-hsl")]
    SetColorHsl {
        /// The device id
        id: u32,

        /// Hue in degrees [0,360)
        hue: f64,

        /// Saturation in percent [0,100]
        saturation: f64,

        /// Lightness in percent [0,100]
        lightness: f64,

        /// Transition time in milliseconds
        #[clap(long, default_value_t = 500)]
        transition_ms: u32,
    },
    /// Sets a device's color as raw CIE 1931 x/y coordinates.
    #[clap(name = "set-color-xy")]
    SetColorXy {
        /// The device id
        id: u32,

        /// CIE x coordinate (0-65536)
        x: u32,

        /// CIE y coordinate (0-65536)
        y: u32,

        /// Transition time in milliseconds
        #[clap(long, default_value_t = 500)]
        transition_ms: u32,
    },
    /// Sets a blind's position.
    #[clap(name = "set-position")]
    SetPosition {
        /// The device id
        id: u32,

        /// Position in percent (0-100)
        position: f32,
    },
    /// GETs an arbitrary resource path and prints the raw payload.
    #[clap(name = "get")]
    Get {
        /// Resource path, e.g. /15001/65536
        path: String,
    },
    /// PUTs a raw payload to an arbitrary resource path.
    #[clap(name = "put")]
    Put {
        /// Resource path, e.g. /15001/65536
        path: String,

        /// The payload to send, verbatim
        payload: String,
    },
}

async fn handle_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Authenticate {
            gateway,
            port,
            security_code,
            client_id,
        } => {
            let session = DtlsSession::connect(
                &format!("{}:{}", gateway, port),
                FACTORY_IDENTITY,
                security_code.as_bytes(),
                HANDSHAKE_TIMEOUT,
            )
            .await?;
            let mut client = TradfriClient::new(session);
            let exchange = client.authenticate(&client_id).await?;
            println!("Identity: {}", client_id);
            println!("Pre-shared key: {}", exchange.token);
            println!("Gateway firmware: {}", exchange.firmware_version);
        }
        Commands::Gateway {
            gateway,
            port,
            identity,
            psk,
            action,
        } => {
            let mut client = TradfriClient::connect(
                &format!("{}:{}", gateway, port),
                &identity,
                psk.as_bytes(),
                HANDSHAKE_TIMEOUT,
            )
            .await?;

            handle_gateway_action(&mut client, action).await?;
        }
    }

    Ok(())
}

async fn handle_gateway_action(
    client: &mut TradfriClient<DtlsSession>,
    action: GatewayAction,
) -> Result<()> {
    match action {
        GatewayAction::ListDevices { output } => {
            let devices = client.list_devices().await?;
            match output {
                OutputFormat::Plaintext => {
                    for device in devices {
                        println!("{:>8}  {}", device.id, device.name);
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&devices)?);
                }
            }
        }
        GatewayAction::ListDeviceIds => {
            for id in client.list_device_ids().await? {
                println!("{}", id);
            }
        }
        GatewayAction::GetDevice { id } => {
            let device = client.get_device(id).await?;
            println!("{}", serde_json::to_string_pretty(&device)?);
        }
        GatewayAction::ListGroups { output } => {
            let groups = client.list_groups().await?;
            match output {
                OutputFormat::Plaintext => {
                    for group in groups {
                        println!("{:>8}  {}  members: {:?}", group.id, group.name, group.member_ids());
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&groups)?);
                }
            }
        }
        GatewayAction::GetGroup { id } => {
            let group = client.get_group(id).await?;
            println!("{}", serde_json::to_string_pretty(&group)?);
        }
        GatewayAction::SetPower { id, power } => {
            let response = client.set_power(id, power).await?;
            println!("Gateway answered {}", response.code);
        }
        GatewayAction::SetDimmer { id, level } => {
            let response = client.set_dimming(id, level).await?;
            println!("Gateway answered {}", response.code);
        }
        GatewayAction::SetState { id, power, level } => {
            let response = client.set_state(id, power, level).await?;
            println!("Gateway answered {}", response.code);
        }
        GatewayAction::SetColorRgb {
            id,
            rgb,
            transition_ms,
        } => {
            let response = client.set_color_rgb_timed(id, &rgb, transition_ms).await?;
            println!("Gateway answered {}", response.code);
        }
        GatewayAction::SetColorHsl {
            id,
            hue,
            saturation,
            lightness,
            transition_ms,
        } => {
            let response = client
                .set_color_hsl_timed(id, hue, saturation, lightness, transition_ms)
                .await?;
            println!("Gateway answered {}", response.code);
        }
        GatewayAction::SetColorXy {
            id,
            x,
            y,
            transition_ms,
        } => {
            let response = client.set_color_xy_timed(id, x, y, transition_ms).await?;
            println!("Gateway answered {}", response.code);
        }
        GatewayAction::SetPosition { id, position } => {
            let response = client.set_positioning(id, position).await?;
            println!("Gateway answered {}", response.code);
        }
        GatewayAction::Get { path } => {
            let response = client.get_raw(&path).await?;
            println!("{} {}", response.code_string(), String::from_utf8_lossy(&response.payload));
        }
        GatewayAction::Put { path, payload } => {
            let response = client.put_raw(&path, &payload).await?;
            println!("{} {}", response.code_string(), String::from_utf8_lossy(&response.payload));
        }
    }

    Ok(())
}
