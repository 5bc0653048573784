pub mod certificate;
pub mod cipher;
pub mod handshake;

pub use certificate::{is_certificate, SanExtractor};
pub use cipher::CipherSuiteProbe;
pub use handshake::{attempt_handshake, HandshakeRequest};
