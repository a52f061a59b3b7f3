use std::net::UdpSocket;

/// Guesses the local IP address used for outbound connections.
///
/// Binds a UDP socket and "connects" it to a public address; UDP being
/// connectionless, no packet is sent, but the OS resolves which interface
/// would carry the traffic. Falls back to `127.0.0.1` on any failure.
pub fn guess_local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}
