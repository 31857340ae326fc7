//! Dispenser line protocol.
//!
//! | Request              | Success reply(s)                           | Failure reply                               |
//! |----------------------|--------------------------------------------|---------------------------------------------|
//! | `MAKE:<BEVERAGE>`    | `ACK:MAKE` then `DONE:SUCCESS`             | `ERROR:UNKNOWN_COFFEE_TYPE`, `ERROR:INSUFFICIENT_INGREDIENT:<list>` |
//! | `REFILL:<ING>`/`ALL` | `ACK:REFILL_SUCCESS:<ING>` / `...:ALL`     | `ERROR:INVALID_INGREDIENT`                  |
//! | `STATUS:INGREDIENTS` | `STATUS:INGREDIENTS:K=V,...`               |                                             |
//! | anything else        |                                            | `ERROR:UNKNOWN_COMMAND`                     |
//!
//! Requests are case-folded to upper case before parsing. Every line is UTF-8
//! terminated by `\n`; a trailing `\r` is tolerated.

use std::fmt;

use crate::error::ProtocolError;
use crate::inventory::{InventorySnapshot, RefillTarget};
use crate::recipe::{Beverage, Ingredient};

/// Longest request line the server will buffer.
pub const MAX_LINE_BYTES: usize = 1024;

/// A well-formed dispenser request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// `MAKE:<BEVERAGE>`
    Make(Beverage),
    /// `REFILL:<INGREDIENT>` or `REFILL:ALL`
    Refill(RefillTarget),
    /// `STATUS:INGREDIENTS`
    Status,
}

impl Request {
    /// Tokenize one request line.
    ///
    /// Lines outside the grammar come back as the error [`Reply`] the server
    /// must send, so the caller never has to invent one.
    pub fn parse(line: &str) -> Result<Request, Reply> {
        let line = line.trim().to_ascii_uppercase();
        let (command, payload) = match line.split_once(':') {
            Some((command, payload)) => (command, payload.trim()),
            None => (line.as_str(), ""),
        };

        match command {
            "MAKE" => payload
                .parse::<Beverage>()
                .map(Request::Make)
                .map_err(|_| Reply::UnknownCoffeeType),
            "REFILL" if payload == "ALL" => Ok(Request::Refill(RefillTarget::All)),
            "REFILL" => payload
                .parse::<Ingredient>()
                .map(|i| Request::Refill(RefillTarget::One(i)))
                .map_err(|_| Reply::InvalidIngredient),
            "STATUS" if payload == "INGREDIENTS" => Ok(Request::Status),
            _ => Err(Reply::UnknownCommand),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Make(beverage) => write!(f, "MAKE:{}", beverage),
            Request::Refill(target) => write!(f, "REFILL:{}", target),
            Request::Status => f.write_str("STATUS:INGREDIENTS"),
        }
    }
}

/// Any line the dispenser can send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `ACK:MAKE`
    AckMake,
    /// `DONE:SUCCESS`
    DoneSuccess,
    /// `ACK:REFILL_SUCCESS:<TARGET>`
    RefillSuccess(RefillTarget),
    /// `STATUS:INGREDIENTS:<NAME>=<QTY>,...`
    Status(InventorySnapshot),
    /// `ERROR:UNKNOWN_COFFEE_TYPE`
    UnknownCoffeeType,
    /// `ERROR:INSUFFICIENT_INGREDIENT:<NAMES>`
    InsufficientIngredient(Vec<Ingredient>),
    /// `ERROR:INVALID_INGREDIENT`
    InvalidIngredient,
    /// `ERROR:UNKNOWN_COMMAND`
    UnknownCommand,
}

impl Reply {
    /// True for every `ERROR:` reply.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Reply::UnknownCoffeeType
                | Reply::InsufficientIngredient(_)
                | Reply::InvalidIngredient
                | Reply::UnknownCommand
        )
    }

    /// Parse a reply line received from the dispenser.
    pub fn parse(line: &str) -> Result<Reply, ProtocolError> {
        let line = line.trim();
        let malformed = || ProtocolError::MalformedReply(line.to_string());

        match line {
            "ACK:MAKE" => return Ok(Reply::AckMake),
            "DONE:SUCCESS" => return Ok(Reply::DoneSuccess),
            "ERROR:UNKNOWN_COFFEE_TYPE" => return Ok(Reply::UnknownCoffeeType),
            "ERROR:INVALID_INGREDIENT" => return Ok(Reply::InvalidIngredient),
            "ERROR:UNKNOWN_COMMAND" => return Ok(Reply::UnknownCommand),
            _ => {}
        }

        if let Some(target) = line.strip_prefix("ACK:REFILL_SUCCESS:") {
            return match target {
                "ALL" => Ok(Reply::RefillSuccess(RefillTarget::All)),
                other => other
                    .parse::<Ingredient>()
                    .map(|i| Reply::RefillSuccess(RefillTarget::One(i)))
                    .map_err(|_| malformed()),
            };
        }

        if let Some(body) = line.strip_prefix("STATUS:INGREDIENTS:") {
            return parse_status_body(body).map(Reply::Status).ok_or_else(malformed);
        }

        if let Some(list) = line.strip_prefix("ERROR:INSUFFICIENT_INGREDIENT:") {
            let missing = list
                .split(',')
                .map(|item| item.parse::<Ingredient>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| malformed())?;
            return Ok(Reply::InsufficientIngredient(missing));
        }

        Err(malformed())
    }
}

fn parse_status_body(body: &str) -> Option<InventorySnapshot> {
    if body.trim().is_empty() {
        return Some(InventorySnapshot::default());
    }
    body.split(',')
        .map(|item| {
            let (name, quantity) = item.split_once('=')?;
            let ingredient = name.parse::<Ingredient>().ok()?;
            let quantity = quantity.trim().parse::<u32>().ok()?;
            Some((ingredient, quantity))
        })
        .collect()
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::AckMake => f.write_str("ACK:MAKE"),
            Reply::DoneSuccess => f.write_str("DONE:SUCCESS"),
            Reply::RefillSuccess(target) => write!(f, "ACK:REFILL_SUCCESS:{}", target),
            Reply::Status(snapshot) => write!(f, "STATUS:INGREDIENTS:{}", snapshot),
            Reply::UnknownCoffeeType => f.write_str("ERROR:UNKNOWN_COFFEE_TYPE"),
            Reply::InsufficientIngredient(missing) => {
                f.write_str("ERROR:INSUFFICIENT_INGREDIENT:")?;
                for (n, ingredient) in missing.iter().enumerate() {
                    if n > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", ingredient)?;
                }
                Ok(())
            }
            Reply::InvalidIngredient => f.write_str("ERROR:INVALID_INGREDIENT"),
            Reply::UnknownCommand => f.write_str("ERROR:UNKNOWN_COMMAND"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        assert_eq!(Request::parse("make:latte"), Ok(Request::Make(Beverage::Latte)));
        assert_eq!(
            Request::parse("MAKE:FLAT WHITE\r\n"),
            Ok(Request::Make(Beverage::FlatWhite))
        );
        assert_eq!(
            Request::parse("refill:all"),
            Ok(Request::Refill(RefillTarget::All))
        );
        assert_eq!(
            Request::parse("REFILL:OAT_MILK"),
            Ok(Request::Refill(RefillTarget::One(Ingredient::OatMilk)))
        );
        assert_eq!(Request::parse("status:ingredients"), Ok(Request::Status));
    }

    #[test]
    fn test_parse_rejections_map_to_error_replies() {
        assert_eq!(Request::parse("MAKE:FRAPPE"), Err(Reply::UnknownCoffeeType));
        assert_eq!(Request::parse("MAKE"), Err(Reply::UnknownCoffeeType));
        assert_eq!(Request::parse("REFILL:SUGAR"), Err(Reply::InvalidIngredient));
        assert_eq!(Request::parse("STATUS:BEANS"), Err(Reply::UnknownCommand));
        assert_eq!(Request::parse("BREW:LATTE"), Err(Reply::UnknownCommand));
        assert_eq!(Request::parse(""), Err(Reply::UnknownCommand));
    }

    #[test]
    fn test_insufficient_reply_lists_all() {
        let reply = Reply::InsufficientIngredient(vec![Ingredient::Milk, Ingredient::CaramelSyrup]);
        let line = reply.to_string();
        assert_eq!(line, "ERROR:INSUFFICIENT_INGREDIENT:MILK, CARAMEL_SYRUP");
        assert_eq!(Reply::parse(&line).unwrap(), reply);
    }

    #[test]
    fn test_status_reply_parses() {
        let reply = Reply::parse("STATUS:INGREDIENTS:MILK=1,OAT_MILK=20").unwrap();
        let Reply::Status(snapshot) = reply else {
            panic!("expected status reply");
        };
        assert_eq!(snapshot.get(Ingredient::Milk), 1);
        assert_eq!(snapshot.get(Ingredient::OatMilk), 20);
    }

    #[test]
    fn test_malformed_replies_rejected() {
        assert!(Reply::parse("STATUS:INGREDIENTS:MILK").is_err());
        assert!(Reply::parse("STATUS:INGREDIENTS:MILK=lots").is_err());
        assert!(Reply::parse("ACK:REFILL_SUCCESS:SUGAR").is_err());
        assert!(Reply::parse("HELLO").is_err());
    }

    #[test]
    fn test_request_display_matches_wire() {
        assert_eq!(Request::Make(Beverage::OatLatte).to_string(), "MAKE:OAT LATTE");
        assert_eq!(
            Request::Refill(RefillTarget::One(Ingredient::Milk)).to_string(),
            "REFILL:MILK"
        );
    }
}
