//! Wire enumerations.

#![allow(clippy::upper_case_acronyms)]

use crate::msgs::codec::{Codec, Reader};

/// Build an enum over a wire integer type with an `Unknown` escape arm.
macro_rules! enum_builder {
    (
        $(#[$comment:meta])*
        @U8
        EnumName: $enum_name:ident;
        EnumVal { $( $enum_var:ident => $enum_val:expr ),* $(,)? }
    ) => {
        $(#[$comment])*
        #[non_exhaustive]
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
        pub enum $enum_name {
            $( $enum_var, )*
            Unknown(u8),
        }

        impl $enum_name {
            pub fn get_u8(&self) -> u8 {
                match *self {
                    $( $enum_name::$enum_var => $enum_val, )*
                    $enum_name::Unknown(x) => x,
                }
            }
        }

        impl Codec for $enum_name {
            fn encode(&self, bytes: &mut Vec<u8>) {
                self.get_u8().encode(bytes);
            }

            fn read(r: &mut Reader) -> Option<Self> {
                u8::read(r).map(|x| Self::from(x))
            }
        }

        impl From<u8> for $enum_name {
            fn from(x: u8) -> Self {
                $( if x == $enum_val {
                    return $enum_name::$enum_var;
                } )*
                $enum_name::Unknown(x)
            }
        }
    };
    (
        $(#[$comment:meta])*
        @U16
        EnumName: $enum_name:ident;
        EnumVal { $( $enum_var:ident => $enum_val:expr ),* $(,)? }
    ) => {
        $(#[$comment])*
        #[non_exhaustive]
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
        pub enum $enum_name {
            $( $enum_var, )*
            Unknown(u16),
        }

        impl $enum_name {
            pub fn get_u16(&self) -> u16 {
                match *self {
                    $( $enum_name::$enum_var => $enum_val, )*
                    $enum_name::Unknown(x) => x,
                }
            }
        }

        impl Codec for $enum_name {
            fn encode(&self, bytes: &mut Vec<u8>) {
                self.get_u16().encode(bytes);
            }

            fn read(r: &mut Reader) -> Option<Self> {
                u16::read(r).map(|x| Self::from(x))
            }
        }

        impl From<u16> for $enum_name {
            fn from(x: u16) -> Self {
                $( if x == $enum_val {
                    return $enum_name::$enum_var;
                } )*
                $enum_name::Unknown(x)
            }
        }
    };
}

enum_builder! {
    /// The `ProtocolVersion` TLS protocol enum.
    @U16
    EnumName: ProtocolVersion;
    EnumVal {
        SSLv3 => 0x0300,
        TLSv1_0 => 0x0301,
        TLSv1_1 => 0x0302,
        TLSv1_2 => 0x0303,
        TLSv1_3 => 0x0304,
    }
}

enum_builder! {
    /// The `ContentType` TLS protocol enum.
    @U8
    EnumName: ContentType;
    EnumVal {
        ChangeCipherSpec => 0x14,
        Alert => 0x15,
        Handshake => 0x16,
        ApplicationData => 0x17,
    }
}

enum_builder! {
    /// The `HandshakeType` TLS protocol enum.
    @U8
    EnumName: HandshakeType;
    EnumVal {
        HelloRequest => 0x00,
        ClientHello => 0x01,
        ServerHello => 0x02,
        NewSessionTicket => 0x04,
        Certificate => 0x0b,
        ServerKeyExchange => 0x0c,
        CertificateRequest => 0x0d,
        ServerHelloDone => 0x0e,
        CertificateVerify => 0x0f,
        ClientKeyExchange => 0x10,
        Finished => 0x14,
    }
}

enum_builder! {
    /// The `AlertLevel` TLS protocol enum.
    @U8
    EnumName: AlertLevel;
    EnumVal {
        Warning => 0x01,
        Fatal => 0x02,
    }
}

enum_builder! {
    /// The `AlertDescription` TLS protocol enum.
    @U8
    EnumName: AlertDescription;
    EnumVal {
        CloseNotify => 0x00,
        UnexpectedMessage => 0x0a,
        BadRecordMac => 0x14,
        RecordOverflow => 0x16,
        HandshakeFailure => 0x28,
        BadCertificate => 0x2a,
        UnsupportedCertificate => 0x2b,
        CertificateExpired => 0x2d,
        CertificateUnknown => 0x2e,
        IllegalParameter => 0x2f,
        UnknownCA => 0x30,
        AccessDenied => 0x31,
        DecodeError => 0x32,
        DecryptError => 0x33,
        ProtocolVersion => 0x46,
        InsufficientSecurity => 0x47,
        InternalError => 0x50,
        InappropriateFallback => 0x56,
        UserCanceled => 0x5a,
        NoRenegotiation => 0x64,
        UnsupportedExtension => 0x6e,
        UnrecognisedName => 0x70,
        NoApplicationProtocol => 0x78,
    }
}

enum_builder! {
    /// The `CipherSuite` TLS protocol enum; only the suites and signalling
    /// values this stack knows about.
    @U16
    EnumName: CipherSuite;
    EnumVal {
        TLS_RSA_WITH_AES_128_GCM_SHA256 => 0x009c,
        TLS_RSA_WITH_AES_256_GCM_SHA384 => 0x009d,
        TLS_DHE_RSA_WITH_AES_128_GCM_SHA256 => 0x009e,
        TLS_DHE_RSA_WITH_AES_256_GCM_SHA384 => 0x009f,
        TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => 0xc02b,
        TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 => 0xc02c,
        TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 => 0xc02f,
        TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => 0xc030,
        TLS_EMPTY_RENEGOTIATION_INFO_SCSV => 0x00ff,
        TLS_FALLBACK_SCSV => 0x5600,
    }
}

enum_builder! {
    /// The `Compression` TLS protocol enum.
    @U8
    EnumName: Compression;
    EnumVal {
        Null => 0x00,
        Deflate => 0x01,
        LSZ => 0x40,
    }
}

enum_builder! {
    /// The `ExtensionType` TLS protocol enum.
    @U16
    EnumName: ExtensionType;
    EnumVal {
        ServerName => 0x0000,
        EllipticCurves => 0x000a,
        ECPointFormats => 0x000b,
        SignatureAlgorithms => 0x000d,
        ALProtocolNegotiation => 0x0010,
        EncryptThenMac => 0x0016,
        ExtendedMasterSecret => 0x0017,
        SessionTicket => 0x0023,
        RenegotiationInfo => 0xff01,
    }
}

enum_builder! {
    /// The `NamedGroup` TLS protocol enum (IANA "TLS Supported Groups").
    @U16
    EnumName: NamedGroup;
    EnumVal {
        secp256r1 => 0x0017,
        secp384r1 => 0x0018,
        secp521r1 => 0x0019,
        brainpoolP256r1 => 0x001a,
        brainpoolP384r1 => 0x001b,
        brainpoolP512r1 => 0x001c,
        X25519 => 0x001d,
    }
}

enum_builder! {
    /// The `ECPointFormat` TLS protocol enum.
    @U8
    EnumName: ECPointFormat;
    EnumVal {
        Uncompressed => 0x00,
        ANSIX962CompressedPrime => 0x01,
        ANSIX962CompressedChar2 => 0x02,
    }
}

enum_builder! {
    /// The TLS 1.2 `HashAlgorithm` enum.
    @U8
    EnumName: HashAlgorithm;
    EnumVal {
        NONE => 0x00,
        MD5 => 0x01,
        SHA1 => 0x02,
        SHA224 => 0x03,
        SHA256 => 0x04,
        SHA384 => 0x05,
        SHA512 => 0x06,
    }
}

enum_builder! {
    /// The TLS 1.2 `SignatureAlgorithm` enum.
    @U8
    EnumName: SignatureAlgorithm;
    EnumVal {
        Anonymous => 0x00,
        RSA => 0x01,
        DSA => 0x02,
        ECDSA => 0x03,
    }
}

enum_builder! {
    /// ClientCertificateType for CertificateRequest.
    @U8
    EnumName: ClientCertificateType;
    EnumVal {
        RSASign => 0x01,
        DSSSign => 0x02,
        RSAFixedDH => 0x03,
        DSSFixedDH => 0x04,
        ECDSASign => 0x40,
    }
}

/// How the premaster secret is agreed; not a wire enum.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum KeyExchangeAlgorithm {
    /// Premaster encrypted to the server's RSA key.
    RSA,
    /// Ephemeral finite-field Diffie-Hellman, RSA-signed.
    DHE,
    /// Ephemeral elliptic-curve Diffie-Hellman.
    ECDHE,
}

impl KeyExchangeAlgorithm {
    /// Does the ServerKeyExchange message exist for this exchange?
    pub fn uses_ephemeral_keys(&self) -> bool {
        !matches!(self, KeyExchangeAlgorithm::RSA)
    }

    pub fn uses_ec(&self) -> bool {
        matches!(self, KeyExchangeAlgorithm::ECDHE)
    }
}
