//! Graph-level mean pooling over a flattened batch

use crate::common::{index_tensor, LayerError, LayerResult};
use candle_core::Tensor;

/// Average node rows per graph id.
///
/// For batches of equally sized dialogs this is the same as reshaping to
/// `(num_graphs, nodes_per_graph, hidden)` and taking the mean over nodes.
pub fn segment_mean(x: &Tensor, node_graph: &[usize], num_graphs: usize) -> LayerResult<Tensor> {
    let (nodes, width) = x.dims2()?;
    if node_graph.len() != nodes {
        return Err(LayerError::DimensionMismatch {
            expected: nodes,
            got: node_graph.len(),
        });
    }

    let mut counts = vec![0u32; num_graphs];
    for (node, &graph) in node_graph.iter().enumerate() {
        match counts.get_mut(graph) {
            Some(count) => *count += 1,
            None => {
                return Err(LayerError::GraphOutOfRange {
                    node,
                    graph,
                    num_graphs,
                })
            }
        }
    }
    if let Some(graph) = counts.iter().position(|&c| c == 0) {
        return Err(LayerError::EmptySegment(graph));
    }

    let device = x.device();
    let sums = Tensor::zeros((num_graphs, width), x.dtype(), device)?.index_add(
        &index_tensor(node_graph, device)?,
        x,
        0,
    )?;
    let counts: Vec<f32> = counts.into_iter().map(|c| c as f32).collect();
    let counts = Tensor::from_vec(counts, (num_graphs, 1), device)?.to_dtype(x.dtype())?;
    Ok(sums.broadcast_div(&counts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Var};

    fn column(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), (values.len(), 1), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_uniform_batch_matches_reshape_mean() {
        let x = Tensor::new(&[[1.0f32, 2.0], [3.0, 4.0], [10.0, 0.0], [20.0, 2.0]], &Device::Cpu).unwrap();
        let pooled = segment_mean(&x, &[0, 0, 1, 1], 2).unwrap();
        let expected = x.reshape((2, 2, 2)).unwrap().mean(1).unwrap();
        assert_eq!(pooled.to_vec2::<f32>().unwrap(), expected.to_vec2::<f32>().unwrap());
    }

    #[test]
    fn test_uneven_graph_sizes() {
        let pooled = segment_mean(&column(&[3.0, 6.0, 9.0]), &[0, 1, 1], 2).unwrap();
        assert_eq!(pooled.to_vec2::<f32>().unwrap(), vec![vec![3.0], vec![7.5]]);
    }

    #[test]
    fn test_empty_graph_is_an_error() {
        let err = segment_mean(&column(&[1.0]), &[0], 2).unwrap_err();
        assert!(matches!(err, LayerError::EmptySegment(1)));
    }

    #[test]
    fn test_unknown_graph_id_names_the_graph() {
        let err = segment_mean(&column(&[1.0, 2.0]), &[0, 3], 2).unwrap_err();
        assert!(matches!(
            err,
            LayerError::GraphOutOfRange {
                node: 1,
                graph: 3,
                num_graphs: 2
            }
        ));
        assert!(err.to_string().contains("graph 3"));
    }

    #[test]
    fn test_gradient_divides_by_count() {
        let x = Var::from_tensor(&column(&[1.0, 2.0, 3.0])).unwrap();
        let pooled = segment_mean(x.as_tensor(), &[0, 1, 1], 2).unwrap();
        let scale = column(&[2.0, 4.0]);
        let grads = (pooled * scale).unwrap().sum_all().unwrap().backward().unwrap();
        let grad = grads.get(x.as_tensor()).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(grad, vec![2.0, 2.0, 2.0]);
    }
}
