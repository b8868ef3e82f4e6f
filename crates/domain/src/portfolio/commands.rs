//! Portfolio commands.

use std::collections::BTreeMap;

use common::{AggregateId, CorrelationId};
use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandRequest, NamedCommand};
use crate::error::DomainError;

/// Command to create a new portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePortfolio {
    /// The portfolio ID to create. Generated when absent.
    #[serde(default = "AggregateId::generate")]
    pub id: AggregateId,

    pub name: String,

    /// Symbol → weight.
    #[serde(default)]
    pub assets: BTreeMap<String, f64>,

    #[serde(default)]
    pub correlation_id: CorrelationId,
}

impl CreatePortfolio {
    /// Creates a new CreatePortfolio command.
    pub fn new<S: Into<String>>(
        id: impl Into<AggregateId>,
        name: impl Into<String>,
        assets: impl IntoIterator<Item = (S, f64)>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            assets: collect_weights(assets),
            correlation_id: CorrelationId::new(),
        }
    }

    /// Replaces the generated correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

impl NamedCommand for CreatePortfolio {
    const NAME: &'static str = "CreatePortfolio";
}

/// Command to replace the name and assets of an existing portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePortfolio {
    pub id: AggregateId,

    pub name: String,

    #[serde(default)]
    pub assets: BTreeMap<String, f64>,

    #[serde(default)]
    pub correlation_id: CorrelationId,
}

impl UpdatePortfolio {
    /// Creates a new UpdatePortfolio command.
    pub fn new<S: Into<String>>(
        id: impl Into<AggregateId>,
        name: impl Into<String>,
        assets: impl IntoIterator<Item = (S, f64)>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            assets: collect_weights(assets),
            correlation_id: CorrelationId::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

impl NamedCommand for UpdatePortfolio {
    const NAME: &'static str = "UpdatePortfolio";
}

/// Command to deallocate and remove a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePortfolio {
    pub id: AggregateId,

    #[serde(default)]
    pub correlation_id: CorrelationId,
}

impl DeletePortfolio {
    /// Creates a new DeletePortfolio command.
    pub fn new(id: impl Into<AggregateId>) -> Self {
        Self {
            id: id.into(),
            correlation_id: CorrelationId::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

impl NamedCommand for DeletePortfolio {
    const NAME: &'static str = "DeletePortfolio";
}

fn collect_weights<S: Into<String>>(
    assets: impl IntoIterator<Item = (S, f64)>,
) -> BTreeMap<String, f64> {
    assets
        .into_iter()
        .map(|(symbol, weight)| (symbol.into(), weight))
        .collect()
}

/// Every command the portfolio domain understands.
#[derive(Debug, Clone, PartialEq)]
pub enum PortfolioCommand {
    Create(CreatePortfolio),
    Update(UpdatePortfolio),
    Delete(DeletePortfolio),
}

impl PortfolioCommand {
    /// Decodes an untyped request into a typed command.
    pub fn from_request(request: CommandRequest) -> Result<Self, DomainError> {
        let kind = request.kind.clone();
        let command = match kind.as_str() {
            k if k == CreatePortfolio::NAME => request.decode_args().map(PortfolioCommand::Create),
            k if k == UpdatePortfolio::NAME => request.decode_args().map(PortfolioCommand::Update),
            k if k == DeletePortfolio::NAME => request.decode_args().map(PortfolioCommand::Delete),
            _ => return Err(DomainError::UnknownCommand(kind)),
        };
        command.map_err(|e| DomainError::validation(format!("Invalid {kind} arguments: {e}")))
    }
}

impl Command for PortfolioCommand {
    fn name(&self) -> &'static str {
        match self {
            PortfolioCommand::Create(_) => CreatePortfolio::NAME,
            PortfolioCommand::Update(_) => UpdatePortfolio::NAME,
            PortfolioCommand::Delete(_) => DeletePortfolio::NAME,
        }
    }

    fn correlation_id(&self) -> &CorrelationId {
        match self {
            PortfolioCommand::Create(cmd) => &cmd.correlation_id,
            PortfolioCommand::Update(cmd) => &cmd.correlation_id,
            PortfolioCommand::Delete(cmd) => &cmd.correlation_id,
        }
    }
}

macro_rules! command_variant {
    ($variant:ident, $command:ty) => {
        impl From<$command> for PortfolioCommand {
            fn from(command: $command) -> Self {
                PortfolioCommand::$variant(command)
            }
        }

        impl TryFrom<PortfolioCommand> for $command {
            type Error = PortfolioCommand;

            fn try_from(command: PortfolioCommand) -> Result<Self, Self::Error> {
                match command {
                    PortfolioCommand::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

command_variant!(Create, CreatePortfolio);
command_variant!(Update, UpdatePortfolio);
command_variant!(Delete, DeletePortfolio);

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: serde_json::Value) -> CommandRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn decodes_create_with_generated_fields() {
        let command = PortfolioCommand::from_request(request(serde_json::json!({
            "type": "CreatePortfolio",
            "args": {"name": "Growth", "assets": {"AAPL": 1.0}}
        })))
        .unwrap();

        let PortfolioCommand::Create(create) = command else {
            panic!("expected CreatePortfolio");
        };
        assert_eq!(create.name, "Growth");
        assert_eq!(create.assets.get("AAPL"), Some(&1.0));
        assert!(!create.id.as_str().is_empty());
        assert!(!create.correlation_id.as_str().is_empty());
    }

    #[test]
    fn decodes_delete_with_explicit_correlation_id() {
        let command = PortfolioCommand::from_request(request(serde_json::json!({
            "type": "DeletePortfolio",
            "args": {"id": "p1", "correlation_id": "c1"}
        })))
        .unwrap();

        assert_eq!(command.name(), "DeletePortfolio");
        assert_eq!(command.correlation_id().as_str(), "c1");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = PortfolioCommand::from_request(request(serde_json::json!({
            "type": "RebalancePortfolio",
            "args": {}
        })));
        assert!(matches!(result, Err(DomainError::UnknownCommand(t)) if t == "RebalancePortfolio"));
    }

    #[test]
    fn malformed_args_are_a_validation_error() {
        let result = PortfolioCommand::from_request(request(serde_json::json!({
            "type": "UpdatePortfolio",
            "args": {"name": "Growth"}
        })));
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn try_from_extracts_matching_variant() {
        let command = PortfolioCommand::from(DeletePortfolio::new("p1"));

        let create = CreatePortfolio::try_from(command.clone());
        assert_eq!(create, Err(command.clone()));

        let delete = DeletePortfolio::try_from(command).unwrap();
        assert_eq!(delete.id.as_str(), "p1");
    }
}
