use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientTimeouts {
    pub connect: Option<Duration>,
    pub response: Option<Duration>,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            response: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientTimeouts {
    pub fn disabled() -> Self {
        Self {
            connect: None,
            response: None,
        }
    }
}
