//! Alert message payload.

use crate::msgs::codec::{Codec, Reader};
use crate::msgs::enums::{AlertDescription, AlertLevel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlertMessagePayload {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl AlertMessagePayload {
    pub fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }
}

impl Codec for AlertMessagePayload {
    fn encode(&self, bytes: &mut Vec<u8>) {
        self.level.encode(bytes);
        self.description.encode(bytes);
    }

    fn read(r: &mut Reader) -> Option<Self> {
        let level = AlertLevel::read(r)?;
        let description = AlertDescription::read(r)?;
        Some(Self { level, description })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding() {
        let a = AlertMessagePayload::fatal(AlertDescription::DecodeError);
        assert_eq!(a.get_encoding(), vec![2, 50]);
        assert_eq!(AlertMessagePayload::read_bytes(&[2, 50]), Some(a));
    }
}
