/// Appended after every block when a page is rendered
pub const PAGE_SEPARATOR: &str = "\n";

/// A run of whole blocks that renders within the page capacity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    blocks: Vec<String>,
}

impl Page {
    pub fn blocks(&self) -> &[String] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            out.push_str(block);
            out.push_str(PAGE_SEPARATOR);
        }
        out
    }

    /// Rendered length in characters
    pub fn rendered_len(&self) -> usize {
        self.blocks.iter().map(|b| block_cost(b)).sum()
    }
}

fn block_cost(block: &str) -> usize {
    block.chars().count() + PAGE_SEPARATOR.chars().count()
}

/// Pack `blocks` in order into the fewest pages of at most `capacity`
/// rendered characters, never splitting a block.
///
/// A block that is too large on its own gets a page to itself; trimming it
/// is up to the caller.
pub fn paginate<I, S>(blocks: I, capacity: usize) -> Vec<Page>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut pages = Vec::new();
    let mut current = Page::default();
    let mut length = 0usize;

    for block in blocks {
        let block = block.into();
        let cost = block_cost(&block);
        if length + cost > capacity && !current.is_empty() {
            pages.push(std::mem::take(&mut current));
            length = 0;
        }
        current.blocks.push(block);
        length += cost;
    }

    if !current.is_empty() {
        pages.push(current);
    }
    pages
}
