use crate::config::StoreConfig;
use crate::stores::{LocalStore, QdrantStore};
use crate::traits::VectorStore;
use crate::StoreError;
use std::sync::Arc;

pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>, StoreError> {
    let store: Arc<dyn VectorStore> = match config {
        StoreConfig::Local { persist_dir } => Arc::new(LocalStore::open(persist_dir).await?),
        StoreConfig::Qdrant { url, collection } => Arc::new(QdrantStore::new(url, collection)),
    };
    Ok(store)
}

pub fn euclidean_distance(left: &[f32], right: &[f32]) -> f64 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = f64::from(*a) - f64::from(*b);
            delta * delta
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::euclidean_distance;

    #[test]
    fn distance_of_identical_vectors_is_zero() {
        assert_eq!(euclidean_distance(&[0.5, 0.5], &[0.5, 0.5]), 0.0);
    }

    #[test]
    fn distance_is_euclidean() {
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-9);
    }
}
