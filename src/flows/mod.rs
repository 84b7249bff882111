//! The console's wizard call sites: steps, payload assembly, and the REST
//! request each flow submits.

pub mod client;
pub mod loan;
pub mod loan_product;

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::api::{ApiClient, ApiError};
use crate::wizard::{FormState, StepDefinition, Wizard, WizardError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Client,
    LoanProduct,
    Loan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// Where a flow's payload goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    pub method: Method,
    pub path: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown flow `{0}` (expected client, loan-product or loan)")]
pub struct UnknownFlow(pub String);

impl Flow {
    pub const ALL: [Flow; 3] = [Flow::Client, Flow::LoanProduct, Flow::Loan];

    pub fn name(self) -> &'static str {
        match self {
            Flow::Client => "client",
            Flow::LoanProduct => "loan-product",
            Flow::Loan => "loan",
        }
    }

    pub fn steps(self) -> Vec<StepDefinition> {
        match self {
            Flow::Client => client::steps(),
            Flow::LoanProduct => loan_product::steps(),
            Flow::Loan => loan::steps(),
        }
    }

    pub fn wizard(self, initial: FormState) -> Result<Wizard, WizardError> {
        Wizard::new(self.steps(), initial)
    }

    /// Request body built from the merged form.
    pub fn assemble(self, form: &FormState, now: OffsetDateTime) -> Value {
        match self {
            Flow::Client => client::assemble(form, now),
            Flow::LoanProduct => loan_product::assemble(form),
            Flow::Loan => loan::assemble(form),
        }
    }

    /// `id` selects the edit variant. Only clients can be edited.
    pub fn request(self, id: Option<&str>) -> FlowRequest {
        let collection = match self {
            Flow::Client => "/clients",
            Flow::LoanProduct => "/loan-products",
            Flow::Loan => "/loans",
        };
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) if self.supports_edit() => FlowRequest {
                method: Method::Put,
                path: format!("{collection}/{id}"),
            },
            _ => FlowRequest {
                method: Method::Post,
                path: collection.to_string(),
            },
        }
    }

    pub fn supports_edit(self) -> bool {
        matches!(self, Flow::Client)
    }

    pub fn success_message(self, editing: bool) -> &'static str {
        match (self, editing && self.supports_edit()) {
            (Flow::Client, true) => "Client updated successfully",
            (Flow::Client, false) => "Client created successfully",
            (Flow::LoanProduct, _) => "Loan product created successfully",
            (Flow::Loan, _) => "Loan application submitted successfully",
        }
    }

    /// Assemble the payload and send it. Used as the wizard's submit
    /// function.
    pub fn send(
        self,
        api: &dyn ApiClient,
        form: &FormState,
        id: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Value, ApiError> {
        let body = self.assemble(form, now);
        let request = self.request(id);
        tracing::info!(
            flow = self.name(),
            method = request.method.as_str(),
            path = %request.path,
            "submitting form"
        );
        match request.method {
            Method::Post => api.post(&request.path, &body),
            Method::Put => api.put(&request.path, &body),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Flow {
    type Err = UnknownFlow;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "client" => Ok(Flow::Client),
            "loan-product" | "product" => Ok(Flow::LoanProduct),
            "loan" => Ok(Flow::Loan),
            _ => Err(UnknownFlow(raw.to_string())),
        }
    }
}
