use serde::{Deserialize, Serialize};
use std::fmt;

use super::lenient;
use crate::error::MetaError;

pub const HEADER_LENGTH: usize = 64;
pub const TASK_INFO_LENGTH: usize = 591;
pub const CLIENT_HEARTBEAT_LENGTH: usize = 32;
pub const GATEWAY_HEARTBEAT_LENGTH: usize = 96;

pub const FILE_MD5_WIDTH: usize = 33;
pub const FILE_NAME_WIDTH: usize = 512;

/// Frames larger than this are rejected before any body allocation.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

pub const PROTOCOL_MAJOR: u8 = 1;
pub const PROTOCOL_MINOR: u8 = 0;

pub const ACK_OK: u32 = 200;
pub const ACK_NOT_FOUND: u32 = 404;

/// Role of the sender or receiver of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PeerType {
    Client = 1,
    Metadata = 2,
    Gateway = 3,
    Status = 4,
    Config = 5,
}

impl PeerType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Every opcode this node sends or understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    ClientUploadRoute = 0x1,
    ClientUploadRouteResp = 0x2,
    ClientUploadSuccess = 0x3,
    ClientQueryNum = 0x4,
    ClientQueryNumResp = 0x5,
    ClientQueryData = 0x6,
    ClientQueryDataResp = 0x7,
    ClientConfigUpgrade = 0x8,
    ClientConfigUpgradeResp = 0x9,
    ClientUpgrade = 0xA,
    ClientUpgradeResp = 0xB,
    ClientDel = 0xC,
    ClientDelResp = 0xD,
    ClientHb = 0x1000,
    ClientHbResp = 0x1001,
    SgwHb = 0x0001_0001,
    SgwHbResp = 0x0001_0002,
    MetadataHb = 0x0003_0001,
    ConfigQuery = 0x0004_0001,
    ConfigQueryResp = 0x0004_0002,
    ConfigHb = 0x0004_0003,
    ConfigHbResp = 0x0004_0004,
    ConfigInfo = 0x0004_0005,
    RemoteQueryNum = 0x0005_0001,
    RemoteQueryNumResp = 0x0005_0002,
    RemoteQueryData = 0x0005_0003,
    RemoteQueryDataResp = 0x0005_0004,
    RemoteDel = 0x0005_0005,
    RemoteDelResp = 0x0005_0006,
}

impl Command {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Command {
    type Error = MetaError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use Command::*;
        let command = match value {
            0x1 => ClientUploadRoute,
            0x2 => ClientUploadRouteResp,
            0x3 => ClientUploadSuccess,
            0x4 => ClientQueryNum,
            0x5 => ClientQueryNumResp,
            0x6 => ClientQueryData,
            0x7 => ClientQueryDataResp,
            0x8 => ClientConfigUpgrade,
            0x9 => ClientConfigUpgradeResp,
            0xA => ClientUpgrade,
            0xB => ClientUpgradeResp,
            0xC => ClientDel,
            0xD => ClientDelResp,
            0x1000 => ClientHb,
            0x1001 => ClientHbResp,
            0x0001_0001 => SgwHb,
            0x0001_0002 => SgwHbResp,
            0x0003_0001 => MetadataHb,
            0x0004_0001 => ConfigQuery,
            0x0004_0002 => ConfigQueryResp,
            0x0004_0003 => ConfigHb,
            0x0004_0004 => ConfigHbResp,
            0x0004_0005 => ConfigInfo,
            0x0005_0001 => RemoteQueryNum,
            0x0005_0002 => RemoteQueryNumResp,
            0x0005_0003 => RemoteQueryData,
            0x0005_0004 => RemoteQueryDataResp,
            0x0005_0005 => RemoteDel,
            0x0005_0006 => RemoteDelResp,
            other => return Err(MetaError::UnknownCommand(other)),
        };
        Ok(command)
    }
}

/// The fixed 64-byte frame header.
///
/// `total_size` is recomputed by [`super::frame`] whenever a frame is built, so callers
/// constructing replies can leave it at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub total_size: u32,
    pub major: u8,
    pub minor: u8,
    pub src_type: u8,
    pub dst_type: u8,
    pub src_id: u32,
    pub dst_id: u32,
    pub trans_id: u64,
    pub sequence: u64,
    pub command: u32,
    pub ack_code: u32,
    pub total: u64,
    pub offset: u64,
    pub count: u32,
}

impl Header {
    pub fn new(command: Command, src: (PeerType, u32), dst: (PeerType, u32)) -> Self {
        Self {
            total_size: HEADER_LENGTH as u32,
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR,
            src_type: src.0.code(),
            dst_type: dst.0.code(),
            src_id: src.1,
            dst_id: dst.1,
            command: command.code(),
            ..Default::default()
        }
    }

    /// Reply header addressed back at the sender of `self`.
    ///
    /// Correlation and pagination fields (`trans_id`, `sequence`, `total`, `offset`, `count`)
    /// are carried over; handlers overwrite the ones their reply redefines.
    pub fn reply(&self, command: Command, ack_code: u32, src_id: u32, dst_type: PeerType) -> Self {
        Self {
            total_size: HEADER_LENGTH as u32,
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR,
            src_type: PeerType::Metadata.code(),
            dst_type: dst_type.code(),
            src_id,
            dst_id: self.src_id,
            trans_id: self.trans_id,
            sequence: self.sequence,
            command: command.code(),
            ack_code,
            total: self.total,
            offset: self.offset,
            count: self.count,
        }
    }

    /// Body length declared by `total_size`.
    pub fn body_len(&self) -> usize {
        (self.total_size as usize).saturating_sub(HEADER_LENGTH)
    }
}

/// A NUL-padded fixed-width byte field.
#[derive(Clone, PartialEq, Eq)]
pub struct FixedBytes<const N: usize>([u8; N]);

impl<const N: usize> FixedBytes<N> {
    /// Copies `raw`, truncating past `N` bytes and zero-padding short input.
    pub fn from_slice(raw: &[u8]) -> Self {
        let mut buf = [0u8; N];
        let len = raw.len().min(N);
        buf[..len].copy_from_slice(&raw[..len]);
        Self(buf)
    }

    pub fn from_text(text: &str) -> Self {
        Self::from_slice(text.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Field contents as text with trailing NUL padding stripped.
    pub fn text(&self) -> String {
        let end = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl<const N: usize> Default for FixedBytes<N> {
    fn default() -> Self {
        Self([0u8; N])
    }
}

impl<const N: usize> fmt::Debug for FixedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.text())
    }
}

/// The fixed part of a file record exchanged on upload, query and delete.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskInfo {
    pub operation: u16,
    pub region_id: u16,
    pub site_id: u32,
    pub app_id: u32,
    pub timestamp: u32,
    pub sgw_port: u16,
    pub proxy_port: u16,
    pub sgw_ip: u32,
    pub proxy_ip: u32,
    pub sgw_id: u32,
    pub proxy_id: u32,
    pub file_len: u64,
    pub file_md5: FixedBytes<FILE_MD5_WIDTH>,
    pub file_name: FixedBytes<FILE_NAME_WIDTH>,
    pub metadata_len: u16,
}

impl TaskInfo {
    pub fn set_gateway(&mut self, ip: u32, port: u16, id: u32) {
        self.sgw_ip = ip;
        self.sgw_port = port;
        self.sgw_id = id;
    }

    pub fn set_proxy(&mut self, ip: u32, port: u16, id: u32) {
        self.proxy_ip = ip;
        self.proxy_port = port;
        self.proxy_id = id;
    }
}

/// Trailing JSON blob of a task record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileOwner {
    #[serde(default, deserialize_with = "lenient::u32_from_any")]
    pub user_id: u32,
    #[serde(default, deserialize_with = "lenient::string_from_any")]
    pub customer_id: String,
}

/// A task record together with its owner blob.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskRecord {
    pub info: TaskInfo,
    pub owner: FileOwner,
}

/// Periodic status body sent by a client installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientHeartbeat {
    pub site_id: u32,
    pub disk_total: u64,
    pub disk_free: u64,
    pub config_version: u16,
    pub client_version: u16,
    pub transactions: u32,
    pub timestamp: u32,
}

/// Periodic status body sent by a storage gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayHeartbeat {
    pub region_id: u32,
    pub system_id: u32,
    pub group_id: u32,
    pub sgw_version: u32,
    pub listen_ip: u32,
    pub listen_port: u16,
    pub timestamp: u32,
    pub cpu_percent: u32,
    pub mem_total: u64,
    pub mem_free: u64,
    pub disk_used: u64,
    pub disk_free: u64,
    pub conn_state: u64,
    pub conn_dealed: u64,
    pub netio_input: u64,
    pub netio_output: u64,
}
