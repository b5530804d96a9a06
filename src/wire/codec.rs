//! Pure encode/decode of frames and records. Nothing here touches a socket.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::*;
use crate::error::{MetaError, Result};

// ============================================================
// HEADER
// ============================================================

pub fn encode_header(header: &Header, buf: &mut BytesMut) {
    buf.reserve(HEADER_LENGTH);
    buf.put_u32(header.total_size);
    buf.put_u8(header.major);
    buf.put_u8(header.minor);
    buf.put_u8(header.src_type);
    buf.put_u8(header.dst_type);
    buf.put_u32(header.src_id);
    buf.put_u32(header.dst_id);
    buf.put_u64(header.trans_id);
    buf.put_u64(header.sequence);
    buf.put_u32(header.command);
    buf.put_u32(header.ack_code);
    buf.put_u64(header.total);
    buf.put_u64(header.offset);
    buf.put_u32(header.count);
    buf.put_bytes(0, 4);
}

pub fn decode_header(raw: &[u8]) -> Result<Header> {
    if raw.len() != HEADER_LENGTH {
        return Err(MetaError::MalformedHeader(format!(
            "expected {} header bytes, got {}",
            HEADER_LENGTH,
            raw.len()
        )));
    }

    let mut buf = raw;
    let header = Header {
        total_size: buf.get_u32(),
        major: buf.get_u8(),
        minor: buf.get_u8(),
        src_type: buf.get_u8(),
        dst_type: buf.get_u8(),
        src_id: buf.get_u32(),
        dst_id: buf.get_u32(),
        trans_id: buf.get_u64(),
        sequence: buf.get_u64(),
        command: buf.get_u32(),
        ack_code: buf.get_u32(),
        total: buf.get_u64(),
        offset: buf.get_u64(),
        count: buf.get_u32(),
    };

    let total_size = header.total_size as usize;
    if total_size < HEADER_LENGTH {
        return Err(MetaError::MalformedHeader(format!(
            "total_size {} shorter than header",
            total_size
        )));
    }
    if total_size > MAX_FRAME_SIZE {
        return Err(MetaError::MalformedHeader(format!(
            "total_size {} exceeds frame limit",
            total_size
        )));
    }

    Ok(header)
}

/// Builds a complete frame, stamping `total_size` from the body length.
pub fn frame(mut header: Header, body: &[u8]) -> Bytes {
    header.total_size = (HEADER_LENGTH + body.len()) as u32;
    let mut buf = BytesMut::with_capacity(HEADER_LENGTH + body.len());
    encode_header(&header, &mut buf);
    buf.put_slice(body);
    buf.freeze()
}

// ============================================================
// TASK RECORDS
// ============================================================

pub fn encode_task_info(info: &TaskInfo, buf: &mut BytesMut) {
    buf.reserve(TASK_INFO_LENGTH);
    buf.put_u16(info.operation);
    buf.put_u16(info.region_id);
    buf.put_u32(info.site_id);
    buf.put_u32(info.app_id);
    buf.put_u32(info.timestamp);
    buf.put_u16(info.sgw_port);
    buf.put_u16(info.proxy_port);
    buf.put_u32(info.sgw_ip);
    buf.put_u32(info.proxy_ip);
    buf.put_u32(info.sgw_id);
    buf.put_u32(info.proxy_id);
    buf.put_u64(info.file_len);
    buf.put_slice(info.file_md5.as_bytes());
    buf.put_slice(info.file_name.as_bytes());
    buf.put_u16(info.metadata_len);
}

pub fn decode_task_info(raw: &[u8]) -> Result<TaskInfo> {
    if raw.len() < TASK_INFO_LENGTH {
        return Err(MetaError::MalformedBody(format!(
            "task info needs {} bytes, got {}",
            TASK_INFO_LENGTH,
            raw.len()
        )));
    }

    let mut buf = &raw[..TASK_INFO_LENGTH];
    let operation = buf.get_u16();
    let region_id = buf.get_u16();
    let site_id = buf.get_u32();
    let app_id = buf.get_u32();
    let timestamp = buf.get_u32();
    let sgw_port = buf.get_u16();
    let proxy_port = buf.get_u16();
    let sgw_ip = buf.get_u32();
    let proxy_ip = buf.get_u32();
    let sgw_id = buf.get_u32();
    let proxy_id = buf.get_u32();
    let file_len = buf.get_u64();
    let file_md5 = FixedBytes::from_slice(&buf[..FILE_MD5_WIDTH]);
    buf.advance(FILE_MD5_WIDTH);
    let file_name = FixedBytes::from_slice(&buf[..FILE_NAME_WIDTH]);
    buf.advance(FILE_NAME_WIDTH);
    let metadata_len = buf.get_u16();

    Ok(TaskInfo {
        operation,
        region_id,
        site_id,
        app_id,
        timestamp,
        sgw_port,
        proxy_port,
        sgw_ip,
        proxy_ip,
        sgw_id,
        proxy_id,
        file_len,
        file_md5,
        file_name,
        metadata_len,
    })
}

/// Appends a task record and its owner blob, fixing up `metadata_len`.
pub fn encode_task(record: &TaskRecord, buf: &mut BytesMut) -> Result<()> {
    let blob = serde_json::to_vec(&record.owner)?;
    let mut info = record.info.clone();
    info.metadata_len = u16::try_from(blob.len())
        .map_err(|_| MetaError::MalformedBody("owner metadata too long".to_string()))?;
    encode_task_info(&info, buf);
    buf.put_slice(&blob);
    Ok(())
}

/// Decodes one task record from the front of `raw`, returning it and the bytes consumed.
pub fn decode_task(raw: &[u8]) -> Result<(TaskRecord, usize)> {
    let info = decode_task_info(raw)?;
    let end = TASK_INFO_LENGTH + info.metadata_len as usize;
    if raw.len() < end {
        return Err(MetaError::MalformedBody(format!(
            "metadata_len {} runs past body end",
            info.metadata_len
        )));
    }
    let owner = if info.metadata_len == 0 {
        FileOwner::default()
    } else {
        serde_json::from_slice(&raw[TASK_INFO_LENGTH..end])?
    };
    Ok((TaskRecord { info, owner }, end))
}

/// Decodes a body made of back-to-back task records.
pub fn decode_tasks(mut raw: &[u8]) -> Result<Vec<TaskRecord>> {
    let mut records = Vec::new();
    while !raw.is_empty() {
        let (record, used) = decode_task(raw)?;
        records.push(record);
        raw = &raw[used..];
    }
    Ok(records)
}

// ============================================================
// HEARTBEATS
// ============================================================

pub fn encode_client_heartbeat(hb: &ClientHeartbeat) -> Bytes {
    let mut buf = BytesMut::with_capacity(CLIENT_HEARTBEAT_LENGTH);
    buf.put_u32(hb.site_id);
    buf.put_u64(hb.disk_total);
    buf.put_u64(hb.disk_free);
    buf.put_u16(hb.config_version);
    buf.put_u16(hb.client_version);
    buf.put_u32(hb.transactions);
    buf.put_u32(hb.timestamp);
    buf.freeze()
}

pub fn decode_client_heartbeat(raw: &[u8]) -> Result<ClientHeartbeat> {
    if raw.len() < CLIENT_HEARTBEAT_LENGTH {
        return Err(MetaError::MalformedBody(format!(
            "client heartbeat needs {} bytes, got {}",
            CLIENT_HEARTBEAT_LENGTH,
            raw.len()
        )));
    }
    let mut buf = raw;
    Ok(ClientHeartbeat {
        site_id: buf.get_u32(),
        disk_total: buf.get_u64(),
        disk_free: buf.get_u64(),
        config_version: buf.get_u16(),
        client_version: buf.get_u16(),
        transactions: buf.get_u32(),
        timestamp: buf.get_u32(),
    })
}

pub fn encode_gateway_heartbeat(hb: &GatewayHeartbeat) -> Bytes {
    let mut buf = BytesMut::with_capacity(GATEWAY_HEARTBEAT_LENGTH);
    buf.put_u32(hb.region_id);
    buf.put_u32(hb.system_id);
    buf.put_u32(hb.group_id);
    buf.put_u32(hb.sgw_version);
    buf.put_u32(hb.listen_ip);
    buf.put_u16(hb.listen_port);
    buf.put_bytes(0, 2);
    buf.put_u32(hb.timestamp);
    buf.put_u32(hb.cpu_percent);
    buf.put_u64(hb.mem_total);
    buf.put_u64(hb.mem_free);
    buf.put_u64(hb.disk_used);
    buf.put_u64(hb.disk_free);
    buf.put_u64(hb.conn_state);
    buf.put_u64(hb.conn_dealed);
    buf.put_u64(hb.netio_input);
    buf.put_u64(hb.netio_output);
    buf.freeze()
}

pub fn decode_gateway_heartbeat(raw: &[u8]) -> Result<GatewayHeartbeat> {
    if raw.len() < GATEWAY_HEARTBEAT_LENGTH {
        return Err(MetaError::MalformedBody(format!(
            "gateway heartbeat needs {} bytes, got {}",
            GATEWAY_HEARTBEAT_LENGTH,
            raw.len()
        )));
    }
    let mut buf = raw;
    let region_id = buf.get_u32();
    let system_id = buf.get_u32();
    let group_id = buf.get_u32();
    let sgw_version = buf.get_u32();
    let listen_ip = buf.get_u32();
    let listen_port = buf.get_u16();
    buf.advance(2);
    Ok(GatewayHeartbeat {
        region_id,
        system_id,
        group_id,
        sgw_version,
        listen_ip,
        listen_port,
        timestamp: buf.get_u32(),
        cpu_percent: buf.get_u32(),
        mem_total: buf.get_u64(),
        mem_free: buf.get_u64(),
        disk_used: buf.get_u64(),
        disk_free: buf.get_u64(),
        conn_state: buf.get_u64(),
        conn_dealed: buf.get_u64(),
        netio_input: buf.get_u64(),
        netio_output: buf.get_u64(),
    })
}

// ============================================================
// JSON BODIES
// ============================================================

pub fn json_body<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

pub fn parse_json<T: DeserializeOwned>(raw: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(raw)?)
}
