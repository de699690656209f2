//! The validated, ordered stage chain.

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

use super::StageDescriptor;
use crate::core::StateField;
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use crate::prompts::{
    PromptTemplate, GENERATE_TEMPLATE, REVIEW_TEMPLATE, SPECIFY_TEMPLATE,
    SPECIFY_WITH_SUMMARY_TEMPLATE, SUMMARIZE_TEMPLATE, VERIFY_TEMPLATE,
};

/// A strictly linear chain of stages in execution order.
///
/// Construction validates the chain once; a registry that exists is always
/// well formed, so the engine never re-checks structure at run time.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: IndexMap<String, StageDescriptor>,
}

impl StageRegistry {
    /// Validates descriptors and orders them by predecessor links.
    ///
    /// Input order does not matter.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is empty, has duplicate names, an
    /// unknown predecessor, more than one first stage, a branch, a cycle, a
    /// stage reading a field no earlier stage produced, an output field that
    /// is already produced, or a prompt placeholder outside the declared
    /// inputs.
    pub fn new(stages: Vec<StageDescriptor>) -> Result<Self, PipelineValidationError> {
        let order = validate_chain(&stages)?;
        let mut pool: HashMap<String, StageDescriptor> = stages
            .into_iter()
            .map(|stage| (stage.name.clone(), stage))
            .collect();
        let stages = order
            .into_iter()
            .filter_map(|name| pool.remove(&name).map(|stage| (name, stage)))
            .collect();
        Ok(Self { stages })
    }

    /// The five-stage chain `summarize → specify → generate → review → verify`.
    #[must_use]
    pub fn standard() -> Self {
        Self::from_ordered(standard_descriptors())
    }

    /// The four-stage chain `specify → generate → review → verify`.
    #[must_use]
    pub fn without_summary() -> Self {
        Self::from_ordered(without_summary_descriptors())
    }

    fn from_ordered(stages: Vec<StageDescriptor>) -> Self {
        Self {
            stages: stages
                .into_iter()
                .map(|stage| (stage.name.clone(), stage))
                .collect(),
        }
    }

    /// Iterates stages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.values()
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.stages.keys().map(String::as_str).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the registry holds no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.get(name)
    }

    /// Returns the zero-based position of a stage.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.get_index_of(name)
    }

    /// Returns the first stage.
    #[must_use]
    pub fn first(&self) -> Option<&StageDescriptor> {
        self.stages.first().map(|(_, stage)| stage)
    }

    /// Returns the last stage.
    #[must_use]
    pub fn last(&self) -> Option<&StageDescriptor> {
        self.stages.last().map(|(_, stage)| stage)
    }
}

/// Descriptors of [`StageRegistry::standard`].
#[must_use]
pub fn standard_descriptors() -> Vec<StageDescriptor> {
    let mut stages = vec![StageDescriptor::new(
        "summarize",
        StateField::Summary,
        PromptTemplate::new(SUMMARIZE_TEMPLATE),
    )
    .with_input(StateField::Input)];
    stages.push(
        StageDescriptor::new(
            "specify",
            StateField::Specification,
            PromptTemplate::new(SPECIFY_WITH_SUMMARY_TEMPLATE),
        )
        .with_inputs([StateField::Input, StateField::Summary])
        .after("summarize"),
    );
    stages.extend(downstream_descriptors());
    stages
}

/// Descriptors of [`StageRegistry::without_summary`].
#[must_use]
pub fn without_summary_descriptors() -> Vec<StageDescriptor> {
    let mut stages = vec![StageDescriptor::new(
        "specify",
        StateField::Specification,
        PromptTemplate::new(SPECIFY_TEMPLATE),
    )
    .with_input(StateField::Input)];
    stages.extend(downstream_descriptors());
    stages
}

fn downstream_descriptors() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor::new(
            "generate",
            StateField::Generated,
            PromptTemplate::new(GENERATE_TEMPLATE),
        )
        .with_input(StateField::Specification)
        .after("specify"),
        StageDescriptor::new(
            "review",
            StateField::Reviewed,
            PromptTemplate::new(REVIEW_TEMPLATE),
        )
        .with_input(StateField::Generated)
        .after("generate"),
        StageDescriptor::new(
            "verify",
            StateField::Verification,
            PromptTemplate::new(VERIFY_TEMPLATE),
        )
        .with_input(StateField::Reviewed)
        .after("review"),
    ]
}

fn chain_error(
    code: &str,
    summary: String,
    stages: Vec<String>,
    hint: &str,
) -> PipelineValidationError {
    PipelineValidationError::new(summary.clone())
        .with_stages(stages)
        .with_error_info(ContractErrorInfo::new(code, summary).with_fix_hint(hint))
}

/// Returns stage names in execution order.
fn validate_chain(stages: &[StageDescriptor]) -> Result<Vec<String>, PipelineValidationError> {
    if stages.is_empty() {
        return Err(chain_error(
            "CONTRACT-004-EMPTY",
            "Stage chain has no stages".to_string(),
            Vec::new(),
            "Add at least one stage to the chain.",
        ));
    }

    let mut by_name: HashMap<&str, &StageDescriptor> = HashMap::new();
    for stage in stages {
        stage.validate()?;
        if by_name.insert(stage.name.as_str(), stage).is_some() {
            return Err(chain_error(
                "CONTRACT-004-DUPLICATE",
                format!("Stage '{}' is defined more than once", stage.name),
                vec![stage.name.clone()],
                "Stage names must be unique within a chain.",
            ));
        }
    }

    let mut successors: HashMap<&str, &str> = HashMap::new();
    let mut roots = Vec::new();
    for stage in stages {
        let Some(pred) = stage.predecessor.as_deref() else {
            roots.push(stage.name.clone());
            continue;
        };
        if !by_name.contains_key(pred) {
            return Err(chain_error(
                "CONTRACT-004-MISSING_DEP",
                format!("Stage '{}' follows unknown stage '{pred}'", stage.name),
                vec![stage.name.clone(), pred.to_string()],
                "Ensure the predecessor is part of the chain.",
            ));
        }
        if let Some(other) = successors.insert(pred, stage.name.as_str()) {
            return Err(chain_error(
                "CONTRACT-004-PREDECESSOR",
                format!(
                    "Stages '{other}' and '{}' both follow '{pred}'; the chain must be linear",
                    stage.name
                ),
                vec![pred.to_string(), other.to_string(), stage.name.clone()],
                "Give each stage a distinct predecessor.",
            ));
        }
    }

    if roots.len() > 1 {
        return Err(chain_error(
            "CONTRACT-004-PREDECESSOR",
            format!("Chain has several first stages: {}", roots.join(", ")),
            roots,
            "Exactly one stage may omit its predecessor.",
        ));
    }

    let mut order: Vec<String> = Vec::with_capacity(stages.len());
    let mut cursor = roots.first().map(String::as_str);
    while let Some(name) = cursor {
        order.push(name.to_string());
        cursor = successors.get(name).copied();
    }

    if order.len() != stages.len() {
        return Err(find_cycle(stages, &order, &by_name).into());
    }

    let mut available: BTreeSet<StateField> = BTreeSet::from([StateField::Input]);
    for name in &order {
        let Some(stage) = by_name.get(name.as_str()) else {
            continue;
        };

        if let Some(field) = stage.input_fields.iter().find(|f| !available.contains(*f)) {
            return Err(chain_error(
                "CONTRACT-004-MISSING_INPUT",
                format!(
                    "Stage '{}' reads '{field}', which no earlier stage produces",
                    stage.name
                ),
                vec![stage.name.clone()],
                "Only declare inputs produced by the caller or by preceding stages.",
            ));
        }

        if available.contains(&stage.output_field) {
            return Err(chain_error(
                "CONTRACT-004-OUTPUT_CONFLICT",
                format!(
                    "Stage '{}' writes '{}', which is already produced earlier in the chain",
                    stage.name, stage.output_field
                ),
                vec![stage.name.clone()],
                "Each field has exactly one producer; the caller owns 'input'.",
            ));
        }

        for placeholder in stage.prompt.placeholders() {
            let declared = placeholder
                .parse::<StateField>()
                .is_ok_and(|field| stage.input_fields.contains(&field));
            if !declared {
                return Err(chain_error(
                    "CONTRACT-004-UNDECLARED_INPUT",
                    format!(
                        "Prompt of stage '{}' uses '{{{placeholder}}}', which is not a declared input",
                        stage.name
                    ),
                    vec![stage.name.clone()],
                    "Add the field to the stage inputs or remove the placeholder.",
                ));
            }
        }

        available.insert(stage.output_field);
    }

    Ok(order)
}

/// Follows predecessor links from an unreachable stage until a name repeats.
fn find_cycle(
    stages: &[StageDescriptor],
    reachable: &[String],
    by_name: &HashMap<&str, &StageDescriptor>,
) -> CycleDetectedError {
    let start = stages
        .iter()
        .find(|stage| !reachable.contains(&stage.name))
        .map_or("", |stage| stage.name.as_str());

    let mut path: Vec<String> = Vec::new();
    let mut current = start;
    loop {
        if let Some(pos) = path.iter().position(|name| name == current) {
            let mut cycle: Vec<String> = path[pos..].iter().rev().cloned().collect();
            cycle.insert(0, current.to_string());
            return CycleDetectedError::new(cycle);
        }
        path.push(current.to_string());
        match by_name.get(current).and_then(|stage| stage.predecessor.as_deref()) {
            Some(pred) => current = pred,
            None => return CycleDetectedError::new(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stage(name: &str, output: StateField, inputs: &[StateField]) -> StageDescriptor {
        let template = inputs
            .iter()
            .map(|field| format!("{{{field}}}"))
            .collect::<Vec<_>>()
            .join("\n");
        StageDescriptor::new(name, output, PromptTemplate::new(template))
            .with_inputs(inputs.iter().copied())
    }

    fn code(result: Result<StageRegistry, PipelineValidationError>) -> String {
        result.unwrap_err().code().unwrap_or_default().to_string()
    }

    #[test]
    fn test_builtin_chains_validate() {
        let standard = StageRegistry::new(standard_descriptors()).unwrap();
        assert_eq!(
            standard.names(),
            vec!["summarize", "specify", "generate", "review", "verify"]
        );
        assert_eq!(StageRegistry::standard().names(), standard.names());

        let short = StageRegistry::new(without_summary_descriptors()).unwrap();
        assert_eq!(short.names(), vec!["specify", "generate", "review", "verify"]);
        assert_eq!(short.first().unwrap().name, "specify");
        assert_eq!(short.last().unwrap().name, "verify");
        assert_eq!(short.position("review"), Some(2));
    }

    #[test]
    fn test_orders_by_predecessor() {
        let mut stages = without_summary_descriptors();
        stages.reverse();
        let registry = StageRegistry::new(stages).unwrap();
        assert_eq!(registry.names(), vec!["specify", "generate", "review", "verify"]);
    }

    #[test]
    fn test_empty_chain() {
        assert_eq!(code(StageRegistry::new(Vec::new())), "CONTRACT-004-EMPTY");
    }

    #[test]
    fn test_duplicate_names() {
        let stages = vec![
            stage("a", StateField::Summary, &[StateField::Input]),
            stage("a", StateField::Specification, &[]),
        ];
        assert_eq!(code(StageRegistry::new(stages)), "CONTRACT-004-DUPLICATE");
    }

    #[test]
    fn test_unknown_predecessor() {
        let stages = vec![
            stage("a", StateField::Summary, &[StateField::Input]),
            stage("b", StateField::Specification, &[]).after("ghost"),
        ];
        assert_eq!(code(StageRegistry::new(stages)), "CONTRACT-004-MISSING_DEP");
    }

    #[test]
    fn test_branching_rejected() {
        let stages = vec![
            stage("a", StateField::Summary, &[StateField::Input]),
            stage("b", StateField::Specification, &[]).after("a"),
            stage("c", StateField::Generated, &[]).after("a"),
        ];
        assert_eq!(code(StageRegistry::new(stages)), "CONTRACT-004-PREDECESSOR");
    }

    #[test]
    fn test_several_roots_rejected() {
        let stages = vec![
            stage("a", StateField::Summary, &[]),
            stage("b", StateField::Specification, &[]),
        ];
        assert_eq!(code(StageRegistry::new(stages)), "CONTRACT-004-PREDECESSOR");
    }

    #[test]
    fn test_cycle_detected() {
        let stages = vec![
            stage("a", StateField::Summary, &[]),
            stage("b", StateField::Specification, &[]).after("c"),
            stage("c", StateField::Generated, &[]).after("b"),
        ];
        let err = StageRegistry::new(stages).unwrap_err();
        assert_eq!(err.code(), Some("CONTRACT-004-CYCLE"));
        assert!(err.stages.contains(&"b".to_string()));
        assert!(err.stages.contains(&"c".to_string()));
    }

    #[test]
    fn test_input_not_yet_available() {
        let stages = vec![
            stage("a", StateField::Summary, &[StateField::Input]),
            stage("b", StateField::Generated, &[StateField::Specification]).after("a"),
        ];
        assert_eq!(code(StageRegistry::new(stages)), "CONTRACT-004-MISSING_INPUT");
    }

    #[test]
    fn test_output_conflict() {
        let stages = vec![
            stage("a", StateField::Summary, &[StateField::Input]),
            stage("b", StateField::Summary, &[StateField::Summary]).after("a"),
        ];
        assert_eq!(code(StageRegistry::new(stages)), "CONTRACT-004-OUTPUT_CONFLICT");

        let writes_input = vec![stage("a", StateField::Input, &[])];
        assert_eq!(code(StageRegistry::new(writes_input)), "CONTRACT-004-OUTPUT_CONFLICT");
    }

    #[test]
    fn test_undeclared_placeholder() {
        let stages = vec![StageDescriptor::new(
            "a",
            StateField::Summary,
            PromptTemplate::new("Summarize {input}"),
        )];
        assert_eq!(code(StageRegistry::new(stages)), "CONTRACT-004-UNDECLARED_INPUT");
    }
}
