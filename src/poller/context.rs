use crate::queries::{Row, Sample};
use crate::sink::ComponentData;

/// Rows of one query against one target, recorded into the target's component
/// envelope. Lives until the sink has consumed it.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub query: &'static str,
    pub rows: Vec<Row>,
    pub component: ComponentData,
    pub metrics_recorded: usize,
}

impl QueryContext {
    pub fn new(query: &'static str, rows: Vec<Row>, component: ComponentData) -> Self {
        let mut context = Self {
            query,
            rows,
            component,
            metrics_recorded: 0,
        };
        context.record_metrics();
        context
    }

    fn record_metrics(&mut self) {
        let mut recorded = 0;

        for row in &self.rows {
            match row {
                Row::Sample(sample) => recorded += record_sample(&mut self.component, sample),
                Row::DmlIncrease(increase) => {
                    #[allow(clippy::cast_precision_loss)]
                    let values = [
                        ("DmlActivity/Reads", increase.reads as f64),
                        ("DmlActivity/Writes", increase.writes as f64),
                    ];
                    for (path, value) in values {
                        if self.component.add_metric(path, "statements", value) {
                            recorded += 1;
                        }
                    }
                }
                // cumulative counters are only reported through DmlIncrease
                Row::DmlActivity(_) => {}
            }
        }

        self.metrics_recorded = recorded;
    }
}

fn record_sample(component: &mut ComponentData, sample: &Sample) -> usize {
    sample
        .values
        .iter()
        .filter(|value| component.add_metric(&sample.path(value), value.unit, value.value))
        .count()
}
