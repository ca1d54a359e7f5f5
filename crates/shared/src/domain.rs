use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(OrderId);
id_newtype!(LineItemId);
id_newtype!(CustomerId);
id_newtype!(MaterialId);
id_newtype!(MeasurementId);
id_newtype!(StatusId);
id_newtype!(PaymentId);
id_newtype!(PaymentModeId);

/// Fulfillment status of a single line item.
///
/// The numeric ids are the ones the order backend assigns; they are not
/// ordered by workflow position (`ReadyForTrial` was added last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    ReadyForTrial,
}

impl LineItemStatus {
    pub const ALL: [LineItemStatus; 5] = [
        LineItemStatus::Pending,
        LineItemStatus::InProgress,
        LineItemStatus::ReadyForTrial,
        LineItemStatus::Completed,
        LineItemStatus::Cancelled,
    ];

    pub fn status_id(self) -> StatusId {
        StatusId(match self {
            LineItemStatus::Pending => 1,
            LineItemStatus::InProgress => 2,
            LineItemStatus::Completed => 3,
            LineItemStatus::Cancelled => 4,
            LineItemStatus::ReadyForTrial => 5,
        })
    }

    pub fn from_status_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.status_id() == id)
    }

    pub fn label(self) -> &'static str {
        match self {
            LineItemStatus::Pending => "Pending",
            LineItemStatus::InProgress => "In Progress",
            LineItemStatus::Completed => "Completed",
            LineItemStatus::Cancelled => "Cancelled",
            LineItemStatus::ReadyForTrial => "Ready for Trial",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRef {
    pub id: StatusId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: CustomerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRef {
    pub id: MaterialId,
    pub name: String,
}
