//! Modbus TCP framing for the grinder's holding registers.
//!
//! Frame layout (all integers big-endian):
//!
//! ```text
//! +----------------+-------------+--------+------+----------+-----------+
//! | transaction id | protocol id | length | unit | function |   data    |
//! |       u16      |   u16 (=0)  |  u16   |  u8  |    u8    | length-2  |
//! +----------------+-------------+--------+------+----------+-----------+
//! ```
//!
//! `length` counts the unit byte plus the PDU. Only the three holding-register
//! functions the grinder needs are modelled; anything else decodes to an
//! illegal-function exception.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CellResult, ProtocolError};

/// MBAP header: transaction, protocol, length, unit.
pub const MBAP_HEADER_LEN: usize = 7;
/// Largest PDU (function byte + data) a conforming peer may send.
pub const MAX_PDU_LEN: usize = 253;

/// Read holding registers.
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
/// Write single register.
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
/// Write multiple registers.
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

const EXCEPTION_FLAG: u8 = 0x80;
const MAX_READ_QUANTITY: u16 = 125;
const MAX_WRITE_QUANTITY: u16 = 123;

/// Standard exception codes used by the grinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not supported.
    IllegalFunction = 0x01,
    /// Register range outside the bank.
    IllegalDataAddress = 0x02,
    /// Value not allowed.
    IllegalDataValue = 0x03,
}

/// One decoded ADU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Echoed back in the reply.
    pub transaction_id: u16,
    /// Addressed unit.
    pub unit_id: u8,
    /// PDU function code.
    pub function: u8,
    /// PDU body after the function code.
    pub data: Bytes,
}

impl Frame {
    /// Header plus PDU, ready for the wire.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + self.data.len());
        buf.put_u16(self.transaction_id);
        buf.put_u16(0);
        buf.put_u16((self.data.len() + 2) as u16);
        buf.put_u8(self.unit_id);
        buf.put_u8(self.function);
        buf.put_slice(&self.data);
        buf.freeze()
    }
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> CellResult<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; MBAP_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let mut header = &header[..];
    let transaction_id = header.get_u16();
    let protocol_id = header.get_u16();
    let length = header.get_u16() as usize;
    let unit_id = header.get_u8();

    if protocol_id != 0 {
        return Err(ProtocolError::MalformedFrame(format!("protocol id {protocol_id}")).into());
    }
    // unit byte + function byte at minimum
    if length < 2 || length - 1 > MAX_PDU_LEN {
        return Err(ProtocolError::MalformedFrame(format!("length {length}")).into());
    }

    let mut pdu = vec![0u8; length - 1];
    reader.read_exact(&mut pdu).await?;
    let mut pdu = Bytes::from(pdu);
    let function = pdu.get_u8();

    Ok(Some(Frame {
        transaction_id,
        unit_id,
        function,
        data: pdu,
    }))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await
}

/// Client-to-server request PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read `count` registers from `start`.
    ReadHoldingRegisters { start: u16, count: u16 },
    /// Write `value` to `addr`.
    WriteSingleRegister { addr: u16, value: u16 },
    /// Write `values` from `start`.
    WriteMultipleRegisters { start: u16, values: Vec<u16> },
}

impl Request {
    /// Function code on the wire.
    pub fn function(&self) -> u8 {
        match self {
            Request::ReadHoldingRegisters { .. } => FC_READ_HOLDING_REGISTERS,
            Request::WriteSingleRegister { .. } => FC_WRITE_SINGLE_REGISTER,
            Request::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// PDU body after the function code.
    pub fn encode_data(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Request::ReadHoldingRegisters { start, count } => {
                buf.put_u16(*start);
                buf.put_u16(*count);
            }
            Request::WriteSingleRegister { addr, value } => {
                buf.put_u16(*addr);
                buf.put_u16(*value);
            }
            Request::WriteMultipleRegisters { start, values } => {
                buf.put_u16(*start);
                buf.put_u16(values.len() as u16);
                buf.put_u8((values.len() * 2) as u8);
                for value in values {
                    buf.put_u16(*value);
                }
            }
        }
        buf.freeze()
    }

    /// Decode a request PDU. Failures map to the exception the server should
    /// answer with.
    pub fn decode(function: u8, mut data: &[u8]) -> Result<Self, ExceptionCode> {
        match function {
            FC_READ_HOLDING_REGISTERS => {
                if data.len() != 4 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let start = data.get_u16();
                let count = data.get_u16();
                if count == 0 || count > MAX_READ_QUANTITY {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Ok(Request::ReadHoldingRegisters { start, count })
            }
            FC_WRITE_SINGLE_REGISTER => {
                if data.len() != 4 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Ok(Request::WriteSingleRegister {
                    addr: data.get_u16(),
                    value: data.get_u16(),
                })
            }
            FC_WRITE_MULTIPLE_REGISTERS => {
                if data.len() < 5 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let start = data.get_u16();
                let count = data.get_u16();
                let byte_count = data.get_u8() as usize;
                if count == 0
                    || count > MAX_WRITE_QUANTITY
                    || byte_count != count as usize * 2
                    || data.remaining() != byte_count
                {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let values = (0..count).map(|_| data.get_u16()).collect();
                Ok(Request::WriteMultipleRegisters { start, values })
            }
            _ => Err(ExceptionCode::IllegalFunction),
        }
    }
}

/// Server-to-client response PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Register values in address order.
    ReadHoldingRegisters(Vec<u16>),
    /// Echo of the write.
    WriteSingleRegister { addr: u16, value: u16 },
    /// Range written.
    WriteMultipleRegisters { start: u16, count: u16 },
    /// Request refused.
    Exception { function: u8, code: ExceptionCode },
}

impl Response {
    /// Function code on the wire, high bit set for exceptions.
    pub fn function(&self) -> u8 {
        match self {
            Response::ReadHoldingRegisters(_) => FC_READ_HOLDING_REGISTERS,
            Response::WriteSingleRegister { .. } => FC_WRITE_SINGLE_REGISTER,
            Response::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
            Response::Exception { function, .. } => function | EXCEPTION_FLAG,
        }
    }

    /// PDU body after the function code.
    pub fn encode_data(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Response::ReadHoldingRegisters(values) => {
                buf.put_u8((values.len() * 2) as u8);
                for value in values {
                    buf.put_u16(*value);
                }
            }
            Response::WriteSingleRegister { addr, value } => {
                buf.put_u16(*addr);
                buf.put_u16(*value);
            }
            Response::WriteMultipleRegisters { start, count } => {
                buf.put_u16(*start);
                buf.put_u16(*count);
            }
            Response::Exception { code, .. } => buf.put_u8(*code as u8),
        }
        buf.freeze()
    }

    /// Decode a response PDU. Exception responses come back as
    /// [`ProtocolError::ModbusException`].
    pub fn decode(function: u8, mut data: &[u8]) -> Result<Self, ProtocolError> {
        let malformed = |what: &str| ProtocolError::MalformedFrame(format!("{what} (function {function:#04x})"));

        if function & EXCEPTION_FLAG != 0 {
            let code = data.first().copied().ok_or_else(|| malformed("empty exception"))?;
            return Err(ProtocolError::ModbusException {
                function: function & !EXCEPTION_FLAG,
                code,
            });
        }

        match function {
            FC_READ_HOLDING_REGISTERS => {
                if data.is_empty() {
                    return Err(malformed("missing byte count"));
                }
                let byte_count = data.get_u8() as usize;
                if byte_count % 2 != 0 || data.remaining() != byte_count {
                    return Err(malformed("byte count mismatch"));
                }
                let values = (0..byte_count / 2).map(|_| data.get_u16()).collect();
                Ok(Response::ReadHoldingRegisters(values))
            }
            FC_WRITE_SINGLE_REGISTER | FC_WRITE_MULTIPLE_REGISTERS => {
                if data.len() != 4 {
                    return Err(malformed("echo length"));
                }
                let a = data.get_u16();
                let b = data.get_u16();
                Ok(if function == FC_WRITE_SINGLE_REGISTER {
                    Response::WriteSingleRegister { addr: a, value: b }
                } else {
                    Response::WriteMultipleRegisters { start: a, count: b }
                })
            }
            other => Err(malformed(&format!("unsupported function {other:#04x}"))),
        }
    }
}
