//! Resources and data sources, one module per GCP service

pub mod billing;
pub mod datalossprevention;
pub mod dialogflow;
pub mod gkebackup;
pub mod managedkafka;
pub mod resourcemanager;
