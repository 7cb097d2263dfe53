//! Minimal FIX 4.4 initiator bridging `NewOrderSingle` flow into the HTTP
//! gateway. Session handling is intentionally thin: logon, heartbeat echo,
//! logout. Nothing here touches engine state directly.

use reqwest::Client;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{orders::Side, symbol::Symbol};

/// FIX field delimiter.
pub const SOH: u8 = 0x01;

#[derive(Debug, Error)]
pub enum FixError {
    #[error("settings: {0}")]
    Settings(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gateway error: {0}")]
    Gateway(#[from] reqwest::Error),
}

/// The subset of a quickfix-style session-settings file this bridge reads.
///
/// The file is INI-shaped (`[DEFAULT]` / `[SESSION]` sections with
/// `Key=Value` lines); section headers are skipped, later keys override
/// earlier ones.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub begin_string: String,
    pub sender_comp_id: String,
    pub target_comp_id: String,
    pub host: String,
    pub port: u16,
    pub heart_bt_int: u64,
}

impl SessionSettings {
    pub fn from_file(path: &Path) -> Result<Self, FixError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, FixError> {
        let mut kv = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((k, v)) = line.split_once('=') {
                kv.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
        let get = |key: &str| {
            kv.get(key)
                .cloned()
                .ok_or_else(|| FixError::Settings(format!("missing key {key}")))
        };
        Ok(SessionSettings {
            begin_string: kv
                .get("BeginString")
                .cloned()
                .unwrap_or_else(|| "FIX.4.4".to_string()),
            sender_comp_id: get("SenderCompID")?,
            target_comp_id: get("TargetCompID")?,
            host: get("SocketConnectHost")?,
            port: get("SocketConnectPort")?
                .parse()
                .map_err(|_| FixError::Settings("SocketConnectPort must be a port number".into()))?,
            heart_bt_int: kv
                .get("HeartBtInt")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }
}

/// A parsed FIX message: tag/value pairs in wire order.
#[derive(Debug)]
pub struct FixMessage {
    fields: Vec<(u32, String)>,
}

impl FixMessage {
    pub fn parse(raw: &[u8]) -> Result<Self, FixError> {
        let mut fields = Vec::new();
        for part in raw.split(|&b| b == SOH) {
            if part.is_empty() {
                continue;
            }
            let text = std::str::from_utf8(part)
                .map_err(|_| FixError::Malformed("non-utf8 field".into()))?;
            let (tag, value) = text
                .split_once('=')
                .ok_or_else(|| FixError::Malformed(format!("field without '=': {text}")))?;
            let tag: u32 = tag
                .parse()
                .map_err(|_| FixError::Malformed(format!("non-numeric tag: {tag}")))?;
            fields.push((tag, value.to_string()));
        }
        if fields.is_empty() {
            return Err(FixError::Malformed("empty message".into()));
        }
        Ok(Self { fields })
    }

    pub fn get(&self, tag: u32) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Tag 35.
    pub fn msg_type(&self) -> Option<&str> {
        self.get(35)
    }
}

/// Wraps `body` in the standard header and trailer: `8=`, `9=` (body
/// length), then the body, then the modulo-256 checksum as `10=NNN`.
pub fn encode(begin_string: &str, body: &[(u32, String)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (tag, value) in body {
        payload.extend_from_slice(format!("{tag}={value}").as_bytes());
        payload.push(SOH);
    }
    let mut msg = Vec::new();
    msg.extend_from_slice(format!("8={begin_string}").as_bytes());
    msg.push(SOH);
    msg.extend_from_slice(format!("9={}", payload.len()).as_bytes());
    msg.push(SOH);
    msg.extend_from_slice(&payload);
    let checksum: u32 = msg.iter().map(|&b| u32::from(b)).sum::<u32>() % 256;
    msg.extend_from_slice(format!("10={checksum:03}").as_bytes());
    msg.push(SOH);
    msg
}

fn session_message(s: &SessionSettings, msg_type: &str, seq: u64, extra: &[(u32, String)]) -> Vec<u8> {
    let mut body: Vec<(u32, String)> = vec![
        (35, msg_type.to_string()),
        (49, s.sender_comp_id.clone()),
        (56, s.target_comp_id.clone()),
        (34, seq.to_string()),
    ];
    body.extend_from_slice(extra);
    encode(&s.begin_string, &body)
}

/// The `NewOrderSingle` fields the engine cares about.
#[derive(Debug, PartialEq)]
pub struct NewOrderSingle {
    pub id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub price: f64,
    pub quantity: u32,
}

impl NewOrderSingle {
    /// Cracks a `35=D` message: `ClOrdID` (11, integer parse), `Symbol`
    /// (55), `Side` (54, `1`/`2`), `Price` (44), `OrderQty` (38).
    pub fn from_message(msg: &FixMessage) -> Result<Self, FixError> {
        if msg.msg_type() != Some("D") {
            return Err(FixError::Malformed("not a NewOrderSingle".into()));
        }
        let field = |tag: u32, name: &str| {
            msg.get(tag)
                .ok_or_else(|| FixError::Malformed(format!("missing {name} ({tag})")))
        };
        let id = field(11, "ClOrdID")?
            .parse()
            .map_err(|_| FixError::Malformed("ClOrdID must be an integer".into()))?;
        let symbol = Symbol::new(field(55, "Symbol")?)
            .map_err(|e| FixError::Malformed(e.to_string()))?;
        let side = match field(54, "Side")? {
            "1" => Side::Buy,
            "2" => Side::Sell,
            other => return Err(FixError::Malformed(format!("unsupported side {other}"))),
        };
        let price = field(44, "Price")?
            .parse()
            .map_err(|_| FixError::Malformed("Price must be numeric".into()))?;
        let quantity = field(38, "OrderQty")?
            .parse()
            .map_err(|_| FixError::Malformed("OrderQty must be a positive integer".into()))?;
        Ok(Self {
            id,
            symbol,
            side,
            price,
            quantity,
        })
    }
}

/// Splits one complete message (everything through the `10=NNN<SOH>`
/// trailer) off the front of `buf`, if one has fully arrived.
fn next_frame(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let trailer = buf.windows(4).position(|w| w == [SOH, b'1', b'0', b'='])? + 1;
    let end = buf[trailer..].iter().position(|&b| b == SOH)? + trailer + 1;
    Some(buf.drain(..end).collect())
}

/// Connects to the counterparty from `settings`, logs on, and forwards every
/// `NewOrderSingle` to the gateway at `api_base` until the peer logs out,
/// the connection drops, or `token` fires.
pub async fn run_fix_bridge(
    settings: SessionSettings,
    api_base: &str,
    token: CancellationToken,
) -> Result<(), FixError> {
    let stream = TcpStream::connect((settings.host.as_str(), settings.port)).await?;
    info!(host = %settings.host, port = settings.port, "fix session connected");
    let (mut reader, mut writer) = stream.into_split();

    let mut out_seq: u64 = 1;
    let logon = session_message(
        &settings,
        "A",
        out_seq,
        &[(98, "0".to_string()), (108, settings.heart_bt_int.to_string())],
    );
    out_seq += 1;
    writer.write_all(&logon).await?;

    let client = Client::new();
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    'session: loop {
        tokio::select! {
            _ = token.cancelled() => {
                let logout = session_message(&settings, "5", out_seq, &[]);
                let _ = writer.write_all(&logout).await;
                info!("fix bridge shutting down");
                break 'session;
            }
            read = reader.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    info!("fix peer closed the session");
                    break 'session;
                }
                buf.extend_from_slice(&chunk[..n]);

                while let Some(frame) = next_frame(&mut buf) {
                    let msg = match FixMessage::parse(&frame) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(reason = %e, "skipping unparseable frame");
                            continue;
                        }
                    };
                    match msg.msg_type() {
                        Some("D") => match NewOrderSingle::from_message(&msg) {
                            Ok(order) => forward_order(&client, api_base, &order).await,
                            Err(e) => warn!(reason = %e, "skipping NewOrderSingle"),
                        },
                        Some("1") => {
                            // TestRequest: heartbeat back, echoing TestReqID
                            let mut body = Vec::new();
                            if let Some(req_id) = msg.get(112) {
                                body.push((112, req_id.to_string()));
                            }
                            let hb = session_message(&settings, "0", out_seq, &body);
                            out_seq += 1;
                            writer.write_all(&hb).await?;
                        }
                        Some("5") => {
                            info!("fix logout received");
                            break 'session;
                        }
                        Some(other) => debug!(msg_type = other, "ignoring session message"),
                        None => warn!("frame without MsgType"),
                    }
                }
            }
        }
    }
    Ok(())
}

/// One order in, one POST out; failures are logged, never fatal to the
/// session.
async fn forward_order(client: &Client, api_base: &str, order: &NewOrderSingle) {
    let res = client
        .post(format!("{api_base}/add_order"))
        .json(&json!({
            "symbol": order.symbol,
            "id": order.id,
            "price": order.price,
            "quantity": order.quantity,
            "side": order.side,
        }))
        .send()
        .await;
    match res {
        Ok(resp) if resp.status().is_success() => {
            info!(symbol = %order.symbol, order_id = order.id, "forwarded NewOrderSingle");
        }
        Ok(resp) => {
            warn!(symbol = %order.symbol, order_id = order.id, status = %resp.status(), "gateway rejected order");
        }
        Err(e) => {
            warn!(error = %e, "failed to reach gateway");
        }
    }
}
