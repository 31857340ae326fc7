//! Message shapes shared with collaborators outside the cell.
//!
//! The cell itself never talks to a delivery robot or an order store; these
//! types pin down the JSON both sides agree on, and give an ingestion layer
//! the pieces it needs to reduce an order record to the bare beverage name
//! [`crate::gateway::OrderGateway::fulfill_order`] consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CellResult;
use crate::gateway::{FulfillmentError, FulfillmentReport};
use crate::recipe::Beverage;

/// Inbound delivery job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// Order identifier assigned upstream.
    pub order_id: String,
    /// Beverage name as ordered.
    pub coffee_type: String,
    /// Whether the robot should pick up ice.
    pub need_ice: bool,
    /// Destination table.
    pub table_number: u32,
}

/// Robot-side delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    /// Robot accepted the delivery.
    Received,
    /// Beverage reached the table.
    DeliveryComplete,
    /// Robot gave up.
    DeliveryFailed,
}

/// Outbound delivery progress. Acknowledgements carry the table, completions
/// the display name of what was delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Order this status refers to.
    pub order_id: String,
    /// Where the delivery stands.
    pub status: DeliveryState,
    /// Present while the delivery is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_number: Option<u32>,
    /// Present once delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coffee_name: Option<String>,
}

impl DeliveryStatus {
    /// Acknowledge `request`.
    pub fn received(request: &DeliveryRequest) -> Self {
        Self {
            order_id: request.order_id.clone(),
            status: DeliveryState::Received,
            table_number: Some(request.table_number),
            coffee_name: None,
        }
    }

    /// Report `request` as delivered.
    pub fn complete(request: &DeliveryRequest) -> Self {
        let ice = if request.need_ice { "with ice" } else { "no ice" };
        Self {
            order_id: request.order_id.clone(),
            status: DeliveryState::DeliveryComplete,
            table_number: None,
            coffee_name: Some(format!("{} ({})", request.coffee_type, ice)),
        }
    }

    /// Report `request` as undeliverable.
    pub fn failed(request: &DeliveryRequest) -> Self {
        Self {
            order_id: request.order_id.clone(),
            status: DeliveryState::DeliveryFailed,
            table_number: Some(request.table_number),
            coffee_name: None,
        }
    }
}

/// Lifecycle of an [`OrderRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Not yet picked up.
    Pending,
    /// Being fulfilled.
    InProgress,
    /// Fulfilled.
    Done,
    /// Fulfillment failed.
    Failed,
}

/// A row in the external order store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Store-assigned key.
    pub id: i64,
    /// Beverage name as ordered.
    pub coffee_type: String,
    /// Whether ice was requested.
    pub bool_ice: bool,
    /// Destination table.
    pub table_num: u32,
    /// Current lifecycle state.
    pub status: OrderStatus,
    /// When the order was stored.
    pub create_time: DateTime<Utc>,
    /// When the order reached a terminal state.
    pub finish_time: Option<DateTime<Utc>>,
    /// Failure text for failed orders.
    pub error_msg: Option<String>,
}

impl OrderRecord {
    /// A pending order created now.
    pub fn new(id: i64, coffee_type: impl Into<String>, bool_ice: bool, table_num: u32) -> Self {
        Self {
            id,
            coffee_type: coffee_type.into(),
            bool_ice,
            table_num,
            status: OrderStatus::Pending,
            create_time: Utc::now(),
            finish_time: None,
            error_msg: None,
        }
    }

    /// The only part of the record the gateway cares about.
    pub fn beverage(&self) -> CellResult<Beverage> {
        self.coffee_type.parse()
    }

    /// Mark the order as being fulfilled.
    pub fn start(&mut self) {
        self.status = OrderStatus::InProgress;
    }

    /// Record the gateway's verdict.
    pub fn finish(&mut self, outcome: &Result<FulfillmentReport, FulfillmentError>) {
        self.finish_time = Some(Utc::now());
        match outcome {
            Ok(_) => {
                self.status = OrderStatus::Done;
                self.error_msg = None;
            }
            Err(e) => {
                self.status = OrderStatus::Failed;
                self.error_msg = Some(e.to_string());
            }
        }
    }

    /// Hand-off to the delivery robot.
    pub fn delivery_request(&self) -> DeliveryRequest {
        DeliveryRequest {
            order_id: self.id.to_string(),
            coffee_type: self.coffee_type.clone(),
            need_ice: self.bool_ice,
            table_number: self.table_num,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivery_request_json() {
        let request: DeliveryRequest = serde_json::from_value(json!({
            "order_id": "001",
            "coffee_type": "MATCHA LATTE",
            "need_ice": true,
            "table_number": 1
        }))
        .unwrap();
        assert_eq!(request.table_number, 1);

        let ack = serde_json::to_value(DeliveryStatus::received(&request)).unwrap();
        assert_eq!(
            ack,
            json!({"order_id": "001", "status": "RECEIVED", "table_number": 1})
        );

        let done = serde_json::to_value(DeliveryStatus::complete(&request)).unwrap();
        assert_eq!(done["status"], "DELIVERY_COMPLETE");
        assert_eq!(done["coffee_name"], "MATCHA LATTE (with ice)");
        assert!(done.get("table_number").is_none());
    }

    #[test]
    fn test_order_record_lifecycle() {
        let mut order = OrderRecord::new(7, "oat latte", false, 3);
        assert_eq!(order.beverage().unwrap(), Beverage::OatLatte);
        order.start();
        assert_eq!(order.status, OrderStatus::InProgress);

        order.finish(&Err(FulfillmentError::UnknownBeverage("X".into())));
        assert_eq!(order.status, OrderStatus::Failed);
        assert!(order.finish_time.is_some());
        assert!(order.error_msg.as_deref().unwrap_or_default().contains("unknown beverage"));

        let row = serde_json::to_value(&order).unwrap();
        assert_eq!(row["status"], "failed");
    }

    #[test]
    fn test_unknown_coffee_type() {
        let order = OrderRecord::new(1, "FRAPPE", true, 2);
        assert!(order.beverage().is_err());
    }
}
