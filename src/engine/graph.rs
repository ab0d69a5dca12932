use std::collections::{HashMap, VecDeque};
use thiserror::Error;

use crate::core::{is_valid_metric_name, Computable};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("computable {computable} requires no metrics")]
    NoRequiredMetrics { computable: String },

    #[error("computable {computable} uses invalid metric name {metric:?}")]
    InvalidMetricName { computable: String, metric: String },

    #[error("metric {metric} is produced by both {first} and {second}")]
    DuplicateOutput {
        metric: String,
        first: String,
        second: String,
    },

    #[error("dependency cycle between computables: {}", .members.join(", "))]
    Cycle { members: Vec<String> },
}

/// Metric → interested computables, plus a valid evaluation order.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<String, Vec<usize>>,
    names: Vec<String>,
    outputs: Vec<String>,
    order: Vec<usize>,
}

impl RoutingTable {
    pub fn build(computables: &[Box<dyn Computable>]) -> Result<Self, GraphError> {
        let mut routes: HashMap<String, Vec<usize>> = HashMap::new();
        let mut producers: HashMap<String, usize> = HashMap::new();
        let names: Vec<String> = computables.iter().map(|c| c.name().to_string()).collect();
        let mut outputs = Vec::with_capacity(computables.len());

        for (idx, computable) in computables.iter().enumerate() {
            let name = &names[idx];
            let required = computable.required_metrics();
            if required.is_empty() {
                return Err(GraphError::NoRequiredMetrics {
                    computable: name.clone(),
                });
            }

            let output = computable.output_metric();
            for metric in required.iter().chain(std::iter::once(&output)) {
                if !is_valid_metric_name(metric) {
                    return Err(GraphError::InvalidMetricName {
                        computable: name.clone(),
                        metric: metric.clone(),
                    });
                }
            }

            if let Some(&first) = producers.get(&output) {
                return Err(GraphError::DuplicateOutput {
                    metric: output,
                    first: names[first].clone(),
                    second: name.clone(),
                });
            }
            producers.insert(output.clone(), idx);
            outputs.push(output);

            for metric in required {
                let targets = routes.entry(metric).or_default();
                if !targets.contains(&idx) {
                    targets.push(idx);
                }
            }
        }

        let order = topological_order(computables.len(), &routes, &producers).map_err(|members| {
            GraphError::Cycle {
                members: members.into_iter().map(|i| names[i].clone()).collect(),
            }
        })?;

        Ok(Self {
            routes,
            names,
            outputs,
            order,
        })
    }

    /// Indices of the computables fed by `metric`
    pub fn targets(&self, metric: &str) -> &[usize] {
        self.routes.get(metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every metric some computable requires
    pub fn input_metrics(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn output_metrics(&self) -> &[String] {
        &self.outputs
    }

    /// Computable names ordered so producers precede consumers
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Kahn's algorithm. On failure returns the nodes left with incoming edges.
fn topological_order(
    count: usize,
    routes: &HashMap<String, Vec<usize>>,
    producers: &HashMap<String, usize>,
) -> Result<Vec<usize>, Vec<usize>> {
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];
    for (metric, &producer) in producers {
        for &consumer in routes.get(metric).map(Vec::as_slice).unwrap_or(&[]) {
            edges[producer].push(consumer);
            in_degree[consumer] += 1;
        }
    }

    let mut ready: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &next in &edges[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() == count {
        Ok(order)
    } else {
        Err((0..count).filter(|&i| in_degree[i] > 0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Datapoint;

    struct Node {
        name: &'static str,
        inputs: Vec<&'static str>,
        output: &'static str,
    }

    impl Computable for Node {
        fn name(&self) -> &str {
            self.name
        }
        fn required_metrics(&self) -> Vec<String> {
            self.inputs.iter().map(|s| s.to_string()).collect()
        }
        fn output_metric(&self) -> String {
            self.output.to_string()
        }
        fn update(&mut self, _point: &Datapoint) -> bool {
            false
        }
        fn compute(&mut self) -> Datapoint {
            Datapoint::now(self.output, 0.0)
        }
    }

    fn node(name: &'static str, inputs: &[&'static str], output: &'static str) -> Box<dyn Computable> {
        Box::new(Node {
            name,
            inputs: inputs.to_vec(),
            output,
        })
    }

    #[test]
    fn test_routes_and_order() {
        let table = RoutingTable::build(&[
            node("Efficiency", &["Power", "Speed"], "Efficiency"),
            node("Power", &["Voltage", "Current"], "Power"),
        ])
        .unwrap();

        assert_eq!(table.targets("Voltage"), &[1]);
        assert_eq!(table.targets("Power"), &[0]);
        assert!(table.targets("Unknown").is_empty());
        assert_eq!(table.evaluation_order(), vec!["Power", "Efficiency"]);
    }

    #[test]
    fn test_cycle_rejected() {
        let err = RoutingTable::build(&[
            node("A", &["B_out"], "A_out"),
            node("B", &["A_out"], "B_out"),
            node("C", &["X"], "C_out"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                members: vec!["A".to_string(), "B".to_string()]
            }
        );
    }

    #[test]
    fn test_self_loop_rejected() {
        let err = RoutingTable::build(&[node("Loop", &["Loop_out"], "Loop_out")]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let err = RoutingTable::build(&[node("A", &["X"], "Out"), node("B", &["Y"], "Out")]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateOutput { ref metric, .. } if metric == "Out"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(matches!(
            RoutingTable::build(&[node("A", &[], "Out")]),
            Err(GraphError::NoRequiredMetrics { .. })
        ));
        assert!(matches!(
            RoutingTable::build(&[node("A", &["Bus Voltage"], "Out")]),
            Err(GraphError::InvalidMetricName { .. })
        ));
    }
}
