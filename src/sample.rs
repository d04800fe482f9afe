use ahash::AHashMap;

use crate::weights::EntityKey;

/// Key → keys it interacted with (user → items or item → users).
pub type Adjacency<K> = AHashMap<K, Vec<K>>;

/// Item → its SPPMI neighbors.
pub type SppmiTable<K> = AHashMap<K, Vec<Feature<K>>>;

/// A weighted reference to another entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<K> {
    pub key: K,
    pub value: f64,
}

impl<K> Feature<K> {
    pub fn new(key: K, value: f64) -> Self {
        Self { key, value }
    }
}

/// Which side of the interaction matrix a record is about.
#[derive(Debug, Clone, PartialEq)]
pub enum Context<K> {
    User(K),
    Item { key: K, sppmi: Vec<Feature<K>> },
}

impl<K> Context<K> {
    pub fn key(&self) -> &K {
        match self {
            Context::User(key) => key,
            Context::Item { key, .. } => key,
        }
    }

    pub fn is_item(&self) -> bool {
        matches!(self, Context::Item { .. })
    }
}

/// One training or validation record: a context and the entities it was
/// observed with.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample<K> {
    pub context: Context<K>,
    pub features: Vec<Feature<K>>,
}

impl<K: EntityKey> TrainingSample<K> {
    pub fn user(key: K, features: Vec<Feature<K>>) -> Self {
        Self {
            context: Context::User(key),
            features,
        }
    }

    pub fn item(key: K, features: Vec<Feature<K>>, sppmi: Vec<Feature<K>>) -> Self {
        Self {
            context: Context::Item { key, sppmi },
            features,
        }
    }

    /// Item-context records for every item of an implicit-feedback
    /// adjacency table, each rater weighted 1.0.
    pub fn items_from_adjacency<'a>(
        item_keys: impl IntoIterator<Item = &'a K>,
        item_to_users: &Adjacency<K>,
        sppmi: &SppmiTable<K>,
    ) -> Vec<Self>
    where
        K: 'a,
    {
        item_keys
            .into_iter()
            .map(|item| {
                let features = item_to_users
                    .get(item)
                    .map(|users| users.iter().map(|u| Feature::new(u.clone(), 1.0)).collect())
                    .unwrap_or_default();
                let neighbors = sppmi.get(item).cloned().unwrap_or_default();
                Self::item(item.clone(), features, neighbors)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tag_is_explicit() {
        let u = TrainingSample::user("makoto", vec![Feature::new("shaver", 1.0)]);
        let i = TrainingSample::item("shaver", vec![], vec![Feature::new("toothbrush", 1.22)]);
        assert!(!u.context.is_item());
        assert!(i.context.is_item());
        assert_eq!(*u.context.key(), "makoto");
        assert_eq!(*i.context.key(), "shaver");
    }

    #[test]
    fn adjacency_records_carry_sppmi_and_unit_ratings() {
        let mut adj: Adjacency<&str> = Adjacency::new();
        adj.insert("shaver", vec!["jackson", "makoto"]);
        let mut sppmi: SppmiTable<&str> = SppmiTable::new();
        sppmi.insert("shaver", vec![Feature::new("toothbrush", 1.22)]);

        let samples = TrainingSample::items_from_adjacency(&["shaver", "lonely"], &adj, &sppmi);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].features.len(), 2);
        assert!(samples[0].features.iter().all(|f| f.value == 1.0));
        match &samples[0].context {
            Context::Item { sppmi, .. } => assert_eq!(sppmi.len(), 1),
            Context::User(_) => panic!("expected item context"),
        }
        assert!(samples[1].features.is_empty());
    }
}
