//! Client connection stream.
//!
//! Unifies plaintext and TLS connections behind one `Read + Write` type so
//! the handler and response writer never care which listener accepted the
//! peer.
use rustls::{ServerConnection, StreamOwned};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};

pub enum ClientStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}
impl ClientStream {
    #[must_use]
    pub fn is_tls(&self) -> bool {
        matches!(self, ClientStream::Tls(..))
    }

    /// Tears the connection down: sends the TLS close-notify when the
    /// session is encrypted, then shuts the socket down in both
    /// directions.  Errors are ignored; the peer may already be gone.
    pub fn shutdown(&mut self) {
        match self {
            ClientStream::Plain(sock) => {
                let _ignored = sock.shutdown(Shutdown::Both);
            }
            ClientStream::Tls(stream) => {
                stream.conn.send_close_notify();
                let _ignored = stream.conn.complete_io(&mut stream.sock);
                let _ignored = stream.sock.shutdown(Shutdown::Both);
            }
        }
    }
}
impl Read for ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, std::io::Error> {
        match self {
            ClientStream::Plain(sock) => sock.read(buf),
            ClientStream::Tls(stream) => stream.read(buf),
        }
    }
}
impl Write for ClientStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        match self {
            ClientStream::Plain(sock) => sock.write(buf),
            ClientStream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> Result<(), std::io::Error> {
        match self {
            ClientStream::Plain(sock) => sock.flush(),
            ClientStream::Tls(stream) => stream.flush(),
        }
    }
}
