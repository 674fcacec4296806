//! View evaluation against the conversation store.

use chrono::Utc;
use tracing::debug;

use super::{
    EvaluatedView, EvaluatedViewItem, SequenceItem, SetOperation, View, ViewCheck, ViewItem,
    ViewQuery, ViewStore,
};
use crate::error::{Result, VaultError};
use crate::model::ConversationTree;
use crate::store::{ConversationComparator, ConversationStore, ListFilters, SearchQuery, SearchScope};

impl ViewStore {
    /// Evaluate a view by name. Returns `None` when the view does not
    /// exist; absent views referenced from a composition are an error.
    pub fn evaluate(
        &self,
        name: &str,
        db: &ConversationStore,
    ) -> Result<Option<EvaluatedView>> {
        let Some(view) = self.load(name)? else {
            return Ok(None);
        };
        let mut visiting = vec![name.to_string()];
        Ok(Some(self.evaluate_spec(&view, db, &mut visiting)?))
    }

    /// Evaluate a view and summarize its issues.
    pub fn check_view(&self, name: &str, db: &ConversationStore) -> Result<ViewCheck> {
        let evaluated = self
            .evaluate(name, db)?
            .ok_or_else(|| VaultError::not_found("view", name))?;

        let mut issues = Vec::new();
        for id in &evaluated.missing_ids {
            issues.push(format!("missing conversation: {id}"));
        }
        for item in &evaluated.items {
            if item.drift_detected {
                issues.push(format!("content drift: {}", item.item.id));
            }
        }

        Ok(ViewCheck {
            resolved_items: evaluated.items.len(),
            missing_ids: evaluated.missing_ids,
            drift_count: evaluated.drift_count,
            issues,
        })
    }

    fn evaluate_spec(
        &self,
        view: &View,
        db: &ConversationStore,
        visiting: &mut Vec<String>,
    ) -> Result<EvaluatedView> {
        let mut missing_ids: Vec<String> = Vec::new();
        // (item, section, conversation) triples before filtering.
        let mut resolved: Vec<(ViewItem, Option<String>, ConversationTree)> = Vec::new();

        if let Some(entries) = &view.items {
            let mut section: Option<String> = None;
            for entry in entries {
                match entry {
                    SequenceItem::Section(marker) => section = Some(marker.title.clone()),
                    SequenceItem::Item(item) => match db.load(&item.id)? {
                        Some(tree) => resolved.push((item.clone(), section.clone(), tree)),
                        None => {
                            missing_ids.push(item.id.clone());
                            if !view.skip_missing {
                                return Err(VaultError::not_found("conversation", &item.id));
                            }
                        }
                    },
                }
            }
        } else if let Some(query) = &view.query {
            for id in query_conversation_ids(query, db)? {
                match db.load(&id)? {
                    Some(tree) => resolved.push((ViewItem::new(&id), None, tree)),
                    None => missing_ids.push(id),
                }
            }
        } else if let Some(composition) = &view.composition {
            let ids = self.compose_ids(composition.operation, &composition.view_names, db, visiting)?;
            for id in ids {
                match db.load(&id)? {
                    Some(tree) => resolved.push((ViewItem::new(&id), None, tree)),
                    None => missing_ids.push(id),
                }
            }
        }

        if let Some(where_filter) = &view.where_filter {
            resolved.retain(|(_, _, tree)| query_matches(where_filter, tree));
        }

        if let Some(order) = &view.order {
            let descending = order.descending;
            match order.field.as_str() {
                "updated_at" => resolved.sort_by_key(|(_, _, t)| t.metadata.updated_at),
                "title" => resolved.sort_by(|(ia, _, ta), (ib, _, tb)| {
                    effective_title(ia, ta)
                        .to_lowercase()
                        .cmp(&effective_title(ib, tb).to_lowercase())
                }),
                _ => resolved.sort_by_key(|(_, _, t)| t.metadata.created_at),
            }
            if descending {
                resolved.reverse();
            }
        }

        if let Some(limit) = view.limit {
            resolved.truncate(limit);
        }

        let mut drift_count = 0;
        let mut items = Vec::with_capacity(resolved.len());
        for (index, (item, section, conversation)) in resolved.into_iter().enumerate() {
            let drift_detected = view.track_changes
                && item.snapshot.as_ref().is_some_and(|snapshot| {
                    ConversationComparator::compute_hash(&conversation) != snapshot.hash
                });
            if drift_detected {
                drift_count += 1;
            }

            let title = effective_title(&item, &conversation);
            items.push(EvaluatedViewItem {
                effective_title: title,
                effective_description: item.description.clone(),
                index,
                section,
                drift_detected,
                item,
                conversation,
            });
        }

        debug!(
            view = %view.name,
            resolved = items.len(),
            missing = missing_ids.len(),
            drift = drift_count,
            "evaluated view"
        );

        Ok(EvaluatedView {
            view: view.clone(),
            items,
            missing_ids,
            drift_count,
            evaluated_at: Utc::now(),
        })
    }

    /// Resolve a composition to an ordered id list, left to right.
    fn compose_ids(
        &self,
        operation: SetOperation,
        view_names: &[String],
        db: &ConversationStore,
        visiting: &mut Vec<String>,
    ) -> Result<Vec<String>> {
        let mut accumulated: Option<Vec<String>> = None;

        for name in view_names {
            if visiting.iter().any(|v| v == name) {
                return Err(VaultError::validation(
                    "view composition",
                    format!("cycle through view '{name}'"),
                ));
            }
            let view = self
                .load(name)?
                .ok_or_else(|| VaultError::not_found("view", name))?;

            visiting.push(name.clone());
            let evaluated = self.evaluate_spec(&view, db, visiting)?;
            visiting.pop();

            let ids: Vec<String> = evaluated
                .items
                .iter()
                .map(|item| item.conversation.id.clone())
                .collect();

            accumulated = Some(match accumulated {
                None => ids,
                Some(mut acc) => match operation {
                    SetOperation::Union => {
                        for id in ids {
                            if !acc.contains(&id) {
                                acc.push(id);
                            }
                        }
                        acc
                    }
                    SetOperation::Intersect => {
                        acc.retain(|id| ids.contains(id));
                        acc
                    }
                    SetOperation::Subtract => {
                        acc.retain(|id| !ids.contains(id));
                        acc
                    }
                },
            });
        }

        Ok(accumulated.unwrap_or_default())
    }
}

fn effective_title(item: &ViewItem, tree: &ConversationTree) -> String {
    item.title
        .clone()
        .or_else(|| tree.title.clone())
        .unwrap_or_else(|| tree.id.clone())
}

/// Translate a view query to a store search and return matching ids.
fn query_conversation_ids(query: &ViewQuery, db: &ConversationStore) -> Result<Vec<String>> {
    let mut filters = ListFilters::new();
    if let Some(tags) = &query.tags {
        filters.tags = tags.clone();
    }
    filters.source = query.source.clone();
    filters.model = query.model.clone();
    filters.starred = query.starred;
    filters.pinned = query.pinned;
    filters.archived = query.archived;

    let mut search = SearchQuery::new()
        .with_filters(filters)
        .with_date_range(query.created_after, query.created_before);

    // The store searches one scope at a time; when both substrings are
    // given, the title match runs in SQL and content is checked below.
    if let Some(title) = &query.title_contains {
        search = search
            .with_text(title.clone())
            .with_scope(SearchScope::TitleOnly);
    } else if let Some(content) = &query.content_contains {
        search = search
            .with_text(content.clone())
            .with_scope(SearchScope::ContentOnly);
    }

    let summaries = db.search_conversations(&search, None, 0)?;
    let mut ids = Vec::with_capacity(summaries.len());

    for summary in summaries {
        if let Some(after) = query.updated_after {
            if summary.updated_at.is_none() || summary.updated_at < Some(after) {
                continue;
            }
        }
        if let Some(before) = query.updated_before {
            if summary.updated_at.is_none() || summary.updated_at > Some(before) {
                continue;
            }
        }
        if query.title_contains.is_some() {
            if let Some(content) = &query.content_contains {
                let Some(tree) = db.load(&summary.id)? else { continue };
                if !tree_contains_text(&tree, content) {
                    continue;
                }
            }
        }
        ids.push(summary.id);
    }
    Ok(ids)
}

/// In-memory predicate used by `where` filters.
fn query_matches(query: &ViewQuery, tree: &ConversationTree) -> bool {
    let meta = &tree.metadata;

    if let Some(tags) = &query.tags {
        if !tags.iter().all(|tag| meta.tags.contains(tag)) {
            return false;
        }
    }
    if let Some(source) = &query.source {
        if meta.source.as_ref() != Some(source) {
            return false;
        }
    }
    if let Some(model) = &query.model {
        if meta.model.as_ref() != Some(model) {
            return false;
        }
    }
    if let Some(starred) = query.starred {
        if meta.is_starred() != starred {
            return false;
        }
    }
    if let Some(pinned) = query.pinned {
        if meta.is_pinned() != pinned {
            return false;
        }
    }
    if let Some(archived) = query.archived {
        if meta.is_archived() != archived {
            return false;
        }
    }
    if let Some(after) = query.created_after {
        if meta.created_at.map_or(true, |ts| ts < after) {
            return false;
        }
    }
    if let Some(before) = query.created_before {
        if meta.created_at.map_or(true, |ts| ts > before) {
            return false;
        }
    }
    if let Some(after) = query.updated_after {
        if meta.updated_at.map_or(true, |ts| ts < after) {
            return false;
        }
    }
    if let Some(before) = query.updated_before {
        if meta.updated_at.map_or(true, |ts| ts > before) {
            return false;
        }
    }
    if let Some(needle) = &query.title_contains {
        let needle = needle.to_lowercase();
        if !tree
            .title
            .as_ref()
            .is_some_and(|title| title.to_lowercase().contains(&needle))
        {
            return false;
        }
    }
    if let Some(needle) = &query.content_contains {
        if !tree_contains_text(tree, needle) {
            return false;
        }
    }
    true
}

fn tree_contains_text(tree: &ConversationTree, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    tree.message_map
        .values()
        .any(|m| m.content.get_text().to_lowercase().contains(&needle))
}
