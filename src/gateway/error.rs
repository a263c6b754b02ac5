use thiserror::Error;

use crate::net::NetError;
use crate::wire_protocol::CodecError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error("cannot encode {pdu}: {source}")]
    Encode {
        pdu: &'static str,
        source: CodecError,
    },
}
