//! Cloud Billing: budgets, billing accounts and their IAM policies

mod account;
mod budget;
mod iam;

pub use account::{BillingAccountDataSource, BillingAccountState};
pub use budget::{
    AllUpdatesRule, Budget, BudgetAmount, BudgetFilter, BudgetState, Money, ThresholdRule,
};
pub use iam::{BillingAccountIam, BillingAccountIamFields, BillingAccountIamUpdater};
