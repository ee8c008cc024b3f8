use crate::types::{Confidence, ServiceGuess};

/// Well-known TCP ports and the service conventionally behind them.
/// Sorted ascending by port; looked up with a binary search.
const PORT_TABLE: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (111, "rpcbind"),
    (135, "msrpc"),
    (139, "netbios-ssn"),
    (143, "imap"),
    (389, "ldap"),
    (443, "https"),
    (445, "smb"),
    (465, "smtps"),
    (587, "submission"),
    (631, "ipp"),
    (636, "ldaps"),
    (873, "rsync"),
    (993, "imaps"),
    (995, "pop3s"),
    (1080, "socks"),
    (1433, "mssql"),
    (1521, "oracle"),
    (1723, "pptp"),
    (2049, "nfs"),
    (2375, "docker"),
    (3128, "http-proxy"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5060, "sip"),
    (5432, "postgresql"),
    (5672, "amqp"),
    (5900, "vnc"),
    (5985, "winrm"),
    (6379, "redis"),
    (8000, "http-alt"),
    (8080, "http-alt"),
    (8443, "https-alt"),
    (9092, "kafka"),
    (9200, "elasticsearch"),
    (11211, "memcached"),
    (27017, "mongodb"),
];

/// Best-effort service identification for an open port.
///
/// A recognizable banner wins over the port table; an unknown port with no
/// recognizable banner yields `{"unknown", Unknown}`. Pure and deterministic:
/// no I/O, banner matching is case-insensitive.
pub fn identify(port: u16, banner: Option<&[u8]>) -> ServiceGuess {
    if let Some(raw) = banner {
        let text = String::from_utf8_lossy(raw).to_lowercase();
        if let Some(name) = match_banner(&text) {
            return ServiceGuess {
                port,
                name: name.to_string(),
                confidence: Confidence::BannerMatch,
            };
        }
    }

    if let Some(name) = lookup_port(port) {
        return ServiceGuess {
            port,
            name: name.to_string(),
            confidence: Confidence::PortTable,
        };
    }

    ServiceGuess {
        port,
        name: "unknown".to_string(),
        confidence: Confidence::Unknown,
    }
}

/// Look a port up in the well-known table.
pub fn lookup_port(port: u16) -> Option<&'static str> {
    PORT_TABLE
        .binary_search_by_key(&port, |&(p, _)| p)
        .ok()
        .map(|i| PORT_TABLE[i].1)
}

/// Match a lowercased banner against known protocol greetings.
///
/// Checks are ordered from most to least specific; `220` greetings are split
/// between SMTP and FTP on the wording of the rest of the line.
fn match_banner(text: &str) -> Option<&'static str> {
    if text.starts_with("ssh-") {
        return Some("ssh");
    }
    if text.starts_with("rfb ") {
        return Some("vnc");
    }
    if text.contains("http/") || text.contains("server:") || text.contains("<html") {
        return Some("http");
    }
    if text.starts_with("220") {
        if text.contains("smtp") || text.contains("esmtp") || text.contains("mail") {
            return Some("smtp");
        }
        return Some("ftp");
    }
    if text.starts_with("+ok") {
        return Some("pop3");
    }
    if text.starts_with("* ok") {
        return Some("imap");
    }
    if text.contains("mysql") {
        return Some("mysql");
    }
    if text.starts_with("amqp") {
        return Some("amqp");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_for_binary_search() {
        for pair in PORT_TABLE.windows(2) {
            assert!(pair[0].0 < pair[1].0, "table out of order near {pair:?}");
        }
    }

    #[test]
    fn well_known_ports_without_banner() {
        let guess = identify(22, None);
        assert_eq!(guess.name, "ssh");
        assert_eq!(guess.confidence, Confidence::PortTable);

        let guess = identify(80, None);
        assert_eq!(guess.name, "http");
        assert_eq!(guess.confidence, Confidence::PortTable);
    }

    #[test]
    fn unknown_port_without_banner() {
        let guess = identify(49999, None);
        assert_eq!(guess.name, "unknown");
        assert_eq!(guess.confidence, Confidence::Unknown);
    }

    #[test]
    fn ssh_banner_beats_port_table() {
        let guess = identify(2222, Some(b"SSH-2.0-OpenSSH_9.6\r\n"));
        assert_eq!(guess.name, "ssh");
        assert_eq!(guess.confidence, Confidence::BannerMatch);
    }

    #[test]
    fn banner_match_is_case_insensitive() {
        let guess = identify(8080, Some(b"HTTP/1.1 200 OK\r\nServer: nginx\r\n"));
        assert_eq!(guess.name, "http");
        let guess = identify(8080, Some(b"http/1.0 301 moved\r\n"));
        assert_eq!(guess.name, "http");
    }

    #[test]
    fn two_twenty_greetings_split_smtp_from_ftp() {
        let guess = identify(25, Some(b"220 mail.example.com ESMTP Postfix\r\n"));
        assert_eq!(guess.name, "smtp");
        assert_eq!(guess.confidence, Confidence::BannerMatch);

        let guess = identify(21, Some(b"220 ProFTPD Server ready.\r\n"));
        assert_eq!(guess.name, "ftp");
    }

    #[test]
    fn pop3_and_imap_greetings() {
        assert_eq!(identify(110, Some(b"+OK Dovecot ready.\r\n")).name, "pop3");
        assert_eq!(
            identify(143, Some(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")).name,
            "imap"
        );
    }

    #[test]
    fn unreadable_banner_falls_back_to_table() {
        let guess = identify(3306, Some(&[0x5b, 0x00, 0x00, 0x00, 0x0a]));
        assert_eq!(guess.name, "mysql");
        assert_eq!(guess.confidence, Confidence::PortTable);
    }
}
