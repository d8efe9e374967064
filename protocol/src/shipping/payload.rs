//! Payloads carried by QR codes and NFC tags.
//!
//! The set is closed: a reader either gets one of these four kinds or an
//! error, never an unrecognised blob to interpret on its own.

use serde::{Deserialize, Serialize};

use crate::pid::Pid;
use crate::zkp::ZkProof;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportPayload {
    /// A bare PID, e.g. printed on a doorplate.
    Address { pid: Pid },
    /// A shipping proof handed to a carrier.
    Proof { proof: Box<ZkProof> },
    /// Parcel locker pickup.
    Locker {
        #[serde(rename = "lockerId")]
        locker_id: String,
        pid: Pid,
    },
    /// A waybill label.
    Delivery {
        #[serde(rename = "waybillId")]
        waybill_id: String,
        #[serde(rename = "trackingNumber")]
        tracking_number: String,
    },
}

impl TransportPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The PID this payload points at, if any.
    pub fn pid(&self) -> Option<&Pid> {
        match self {
            TransportPayload::Address { pid } | TransportPayload::Locker { pid, .. } => Some(pid),
            TransportPayload::Proof { proof } => Some(&proof.public_inputs.pid),
            TransportPayload::Delivery { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::{encode, NormalizedAddress, Precision};

    fn pid() -> Pid {
        encode(&NormalizedAddress::new("JP").with_admin1("13"), Precision::Admin1).unwrap()
    }

    #[test]
    fn kind_tag_on_the_wire() {
        let payload = TransportPayload::Locker {
            locker_id: "L-42".into(),
            pid: pid(),
        };
        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["kind"], "locker");
        assert_eq!(json["lockerId"], "L-42");
        assert_eq!(TransportPayload::from_json(&payload.to_json().unwrap()).unwrap(), payload);
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(TransportPayload::from_json(r#"{"kind":"coupon","code":"X"}"#).is_err());
        assert!(TransportPayload::from_json(r#"{"pid":"JP-13"}"#).is_err());
    }

    #[test]
    fn delivery_has_no_pid() {
        let payload = TransportPayload::Delivery {
            waybill_id: "w".into(),
            tracking_number: "VEY0000000001".into(),
        };
        assert!(payload.pid().is_none());
        assert_eq!(TransportPayload::Address { pid: pid() }.pid(), Some(&pid()));
    }
}
