use std::collections::BTreeMap;

use crate::command::{Annotation, CommandId};
use crate::error::AnnotationError;
use crate::PageNumber;

/// Page number → commands in z-order (later entries paint on top).
#[derive(Debug, Clone, Default)]
pub struct PageAnnotationSet {
    page_count: usize,
    pages: BTreeMap<PageNumber, Vec<Annotation>>,
}

impl PageAnnotationSet {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            pages: BTreeMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn contains_page(&self, page: PageNumber) -> bool {
        page >= 1 && page <= self.page_count
    }

    pub fn validate_page(&self, page: PageNumber) -> Result<(), AnnotationError> {
        if self.contains_page(page) {
            Ok(())
        } else {
            Err(AnnotationError::InvalidPage {
                page,
                page_count: self.page_count,
            })
        }
    }

    /// Appends on top of the page's existing commands.
    pub fn insert(&mut self, annotation: Annotation) -> Result<(), AnnotationError> {
        let page = annotation.page();
        self.validate_page(page)?;
        self.pages.entry(page).or_default().push(annotation);
        Ok(())
    }

    /// Removes exactly the command carrying `id`; commands with equal content stay.
    pub fn remove(&mut self, page: PageNumber, id: CommandId) -> Option<Annotation> {
        let commands = self.pages.get_mut(&page)?;
        let index = commands.iter().position(|a| a.id == id)?;
        let removed = commands.remove(index);
        if commands.is_empty() {
            self.pages.remove(&page);
        }
        Some(removed)
    }

    pub fn commands(&self, page: PageNumber) -> &[Annotation] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, page: PageNumber, id: CommandId) -> Option<&Annotation> {
        self.commands(page).iter().find(|a| a.id == id)
    }

    /// Every stored command, ordered by page then z-order.
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.pages.values().flatten()
    }

    pub fn annotated_pages(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.pages.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
