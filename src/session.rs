//! The connection to the HV system.
//!
//! Every operation in the crate funnels through [`Transport::call`]. A call either fails at the
//! transport level, or returns the firmware's return code together with its outputs. Translating a
//! non-zero return code is left to the caller. There is no retry policy here.

use log::{debug, trace};

use crate::{
    error::{Error, Result},
    protocol::{Reply, Request, REPLY_HEADER_LEN},
};

/// Request/response channel to the HV system. One outstanding request at a time.
pub trait Transport {
    type Error: embedded_io::Error;

    fn call(&mut self, request: &Request) -> Result<Reply, Self::Error>;
}

/// You can create a session using any interface which implements [embedded_io::Read] &
/// [embedded_io::Write]. `L` is the capacity of the request frame buffer.
pub struct Session<S: embedded_io::Read + embedded_io::Write, const L: usize = 256> {
    interface: S,
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> Session<S, L> {
    /// Initialise the HV system at `address` over an already opened interface.
    pub fn connect(
        interface: S,
        address: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, S::Error> {
        let mut session = Self { interface };
        let reply = session.call(&Request::Init {
            address: address.to_owned(),
            username: username.to_owned(),
            password: password.to_owned(),
        })?;
        if !reply.code.is_ok() {
            return Err(Error::Connection(reply.code));
        }
        debug!("Initialised HV system at {address}");
        Ok(session)
    }

    /// Release the HV system and hand back the interface.
    pub fn disconnect(mut self) -> Result<S, S::Error> {
        let reply = self.call(&Request::Deinit)?;
        if !reply.code.is_ok() {
            debug!("Deinit returned {}", reply.code);
        }
        Ok(self.interface)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), S::Error> {
        self.interface.read_exact(buf).map_err(|e| match e {
            embedded_io::ReadExactError::UnexpectedEof => Error::InvalidResponse,
            embedded_io::ReadExactError::Other(e) => Error::Transport(e),
        })
    }
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> Transport for Session<S, L> {
    type Error = S::Error;

    fn call(&mut self, request: &Request) -> Result<Reply, S::Error> {
        let mut buff: heapless::Vec<u8, L> = heapless::Vec::new();
        request.encode::<S::Error, L>(&mut buff)?;
        trace!("Send frame: {:02X?}", buff.as_slice());

        self.interface
            .write_all(&buff)
            .map_err(Error::Transport)?;
        self.interface.flush().map_err(Error::Transport)?;

        let mut header = [0u8; REPLY_HEADER_LEN];
        self.read_exact(&mut header)?;
        let (code, len) = Reply::parse_header::<S::Error>(&header, request.opcode())?;

        let mut body = vec![0u8; len];
        self.read_exact(&mut body)?;
        trace!("Reply {code}: {body:02X?}");

        Reply::decode_body(code, &body)
    }
}
