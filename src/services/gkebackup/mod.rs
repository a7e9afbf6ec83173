//! Backup for GKE: backup plans and their IAM policies

mod backup_plan;
mod iam;

pub use backup_plan::{
    BackupConfig, BackupPlan, BackupPlanState, BackupSchedule, EncryptionKey, RetentionPolicy,
    SelectedNamespaces,
};
pub use iam::{BackupPlanIam, BackupPlanIamFields, BackupPlanIamUpdater};
