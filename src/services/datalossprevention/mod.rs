//! Cloud Data Loss Prevention templates

mod inspect_template;

pub use inspect_template::{
    Dictionary, ExclusionRule, HotwordRule, InfoType, InfoTypeLimit, InspectConfig,
    InspectTemplate, InspectTemplateState, LikelihoodAdjustment, Limits, Proximity, Regex, Rule,
    RuleSet, WordList,
};
