//! Facet labels resolved from the catalog

use crate::catalog::{
    CatalogRepository, CATEGORY_ENTITY, DELIVERY_TIME_ENTITY, MANUFACTURER_ENTITY,
};
use crate::metrics::record_degraded;
use crate::search::error::SearchResult;
use crate::search::facets::{finalize_facet_group, FacetDescriptor, FacetGroup, FacetGroupKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct EntityLabel {
    name: String,
    display_order: i32,
    published: bool,
}

/// Names facet values after catalog entities, preferring localized names
#[derive(Clone)]
pub struct FacetLabelResolver {
    repository: Arc<dyn CatalogRepository>,
}

impl FacetLabelResolver {
    pub fn new(repository: Arc<dyn CatalogRepository>) -> Self {
        Self { repository }
    }

    /// Label entity facets, then finalize every group against its descriptor.
    ///
    /// A label lookup failure is logged and leaves the facets unlabelled.
    pub async fn apply(
        &self,
        groups: &mut BTreeMap<String, FacetGroup>,
        descriptors: &BTreeMap<String, FacetDescriptor>,
        language_id: i64,
    ) {
        if let Err(e) = self.label(groups, language_id).await {
            tracing::error!(error = %e, "Failed to resolve facet labels");
            record_degraded("labels");
        }

        for (key, group) in groups.iter_mut() {
            if let Some(descriptor) = descriptors.get(key) {
                finalize_facet_group(group, descriptor);
            }
        }
    }

    async fn label(
        &self,
        groups: &mut BTreeMap<String, FacetGroup>,
        language_id: i64,
    ) -> SearchResult<()> {
        for group in groups.values_mut() {
            if !group.kind.is_entity() || group.facets.is_empty() {
                continue;
            }
            let labels = self.entity_labels(group.kind, language_id).await?;
            for facet in &mut group.facets {
                let Some(id) = facet.value.value.as_i64() else {
                    continue;
                };
                match labels.get(&id) {
                    Some(label) => {
                        facet.value.label = Some(label.name.clone());
                        facet.value.display_order = label.display_order;
                        facet.published = label.published;
                    }
                    None => {
                        tracing::debug!(kind = ?group.kind, id, "No catalog entity for facet value");
                        facet.published = false;
                    }
                }
            }
        }
        Ok(())
    }

    async fn entity_labels(
        &self,
        kind: FacetGroupKind,
        language_id: i64,
    ) -> SearchResult<HashMap<i64, EntityLabel>> {
        let (group, mut labels): (&str, HashMap<i64, EntityLabel>) = match kind {
            FacetGroupKind::Category => (
                CATEGORY_ENTITY,
                self.repository
                    .categories()
                    .await?
                    .into_iter()
                    .map(|c| {
                        let label = EntityLabel {
                            name: c.name,
                            display_order: c.display_order,
                            published: c.published && !c.deleted,
                        };
                        (c.id, label)
                    })
                    .collect(),
            ),
            FacetGroupKind::Brand => (
                MANUFACTURER_ENTITY,
                self.repository
                    .manufacturers()
                    .await?
                    .into_iter()
                    .map(|m| {
                        let label = EntityLabel {
                            name: m.name,
                            display_order: m.display_order,
                            published: m.published && !m.deleted,
                        };
                        (m.id, label)
                    })
                    .collect(),
            ),
            FacetGroupKind::DeliveryTime => (
                DELIVERY_TIME_ENTITY,
                self.repository
                    .delivery_times()
                    .await?
                    .into_iter()
                    .map(|d| {
                        let label = EntityLabel {
                            name: d.name,
                            display_order: d.display_order,
                            published: true,
                        };
                        (d.id, label)
                    })
                    .collect(),
            ),
            _ => return Ok(HashMap::new()),
        };

        if language_id != 0 {
            for property in self.repository.localized_properties(group, language_id).await? {
                if property.locale_key != "Name" || property.locale_value.trim().is_empty() {
                    continue;
                }
                if let Some(label) = labels.get_mut(&property.entity_id) {
                    label.name = property.locale_value;
                }
            }
        }

        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, InMemoryCatalog, LocalizedProperty};
    use crate::search::facets::{Facet, FacetValue, CATALOG_FACET_SCOPE};

    fn category_group(ids: &[i64]) -> FacetGroup {
        FacetGroup {
            scope: CATALOG_FACET_SCOPE.to_string(),
            key: "categoryid".to_string(),
            label: None,
            kind: FacetGroupKind::Category,
            is_multi_select: false,
            display_order: 0,
            facets: ids
                .iter()
                .map(|id| Facet::new(FacetValue::new(*id), 1))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_localized_labels_with_fallback() {
        let catalog = InMemoryCatalog::new();
        catalog.save_category(Category::new(1, "Lamps"));
        catalog.save_category(Category::new(2, "Chairs"));
        let mut hidden = Category::new(3, "Hidden");
        hidden.published = false;
        catalog.save_category(hidden);
        catalog.add_localized_property(LocalizedProperty::name(CATEGORY_ENTITY, 1, 2, "Lampen"));

        let resolver = FacetLabelResolver::new(Arc::new(catalog));
        let mut groups = BTreeMap::new();
        groups.insert("categoryid".to_string(), category_group(&[1, 2, 3]));
        let mut descriptors = BTreeMap::new();
        descriptors.insert(
            "categoryid".to_string(),
            FacetDescriptor::new("categoryid").order_by(crate::search::facets::FacetSorting::LabelAsc),
        );

        resolver.apply(&mut groups, &descriptors, 2).await;

        let labels: Vec<String> = groups["categoryid"]
            .facets
            .iter()
            .filter_map(|f| f.value.label.clone())
            .collect();
        assert_eq!(labels, vec!["Chairs".to_string(), "Lampen".to_string()]);
    }
}
