use crate::{
    error::{DaemonError, Result},
    lighting::color::Rgb,
};

/// Status byte the controller answers with when a command was accepted.
pub const STATUS_OK: u8 = 0xFC;

/// Length of every response report.
pub const RESPONSE_LEN: usize = 193;

/// Largest output report the controller accepts, report id included.
pub const REPORT_LEN: usize = 65;

/// Header of a `SetRgb` packet: report id, command, sub-command, port, mode.
const RGB_HEADER_LEN: usize = 5;

/// Colors carried by one `SetRgb` packet.
pub const COLORS_PER_PACKET: usize = (REPORT_LEN - RGB_HEADER_LEN) / 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Init,
    GetData { port: u8 },
    SetSpeed { port: u8, speed: u8 },
    SetRgb { port: u8, mode: u8, colors: Vec<Rgb> },
}

impl Command {
    /// Encodes the command as one or more output reports, each at most
    /// [`REPORT_LEN`] bytes. Every packet is answered with its own status.
    ///
    /// Long color lists are split: the first packet uses sub-command `0x52`
    /// (start at LED 0), the following ones `0x53` (append) with the index of
    /// their first LED in place of the mode byte.
    pub fn to_packets(&self) -> Vec<Vec<u8>> {
        match *self {
            Command::Init => vec![vec![0x00, 0xFE, 0x33]],
            Command::GetData { port } => vec![vec![0x00, 0x33, 0x51, port]],
            Command::SetSpeed { port, speed } => vec![vec![0x00, 0x32, 0x51, port, 0x01, speed]],
            Command::SetRgb {
                port,
                mode,
                ref colors,
            } => {
                if colors.is_empty() {
                    return vec![vec![0x00, 0x32, 0x52, port, mode]];
                }
                colors
                    .chunks(COLORS_PER_PACKET)
                    .enumerate()
                    .map(|(i, chunk)| {
                        let header = match i {
                            0 => [0x00, 0x32, 0x52, port, mode],
                            _ => [0x00, 0x32, 0x53, port, (i * COLORS_PER_PACKET) as u8],
                        };
                        let mut buf = Vec::with_capacity(RGB_HEADER_LEN + 3 * chunk.len());
                        buf.extend_from_slice(&header);
                        // the controller expects green first
                        for c in chunk {
                            buf.extend_from_slice(&[c.g, c.r, c.b]);
                        }
                        buf
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    Status(u8),
    Data { speed: u8, rpm: u16 },
}

impl Response {
    pub fn parse(cmd: &Command, buf: &[u8]) -> Result<Self> {
        match cmd {
            Command::Init | Command::SetSpeed { .. } | Command::SetRgb { .. } => buf
                .get(2)
                .copied()
                .map(Response::Status)
                .ok_or_else(|| DaemonError::Transport(format!("empty status report: {buf:?}"))),
            Command::GetData { .. } => {
                if buf.len() < 5 {
                    return Err(DaemonError::Transport(format!(
                        "data report too short ({} bytes)",
                        buf.len()
                    )));
                }
                let speed = buf[2];
                let rpm = u16::from(buf[4]) << 8 | u16::from(buf[3]);
                Ok(Response::Data { speed, rpm })
            }
        }
    }

    /// Turns a status response into `Ok(())` when the controller accepted the command.
    pub fn expect_ok(self) -> std::result::Result<(), String> {
        match self {
            Response::Status(STATUS_OK) => Ok(()),
            Response::Status(code) => Err(format!("controller rejected command (status {code:#04X})")),
            other => Err(format!("unexpected response {other:?}")),
        }
    }
}
