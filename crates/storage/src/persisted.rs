//! B+trees whose nodes live in pager pages.
//!
//! Each node is one page. Reads deserialize the cached page; every mutated
//! node is serialized back into its cached page before the mutating call
//! returns, and reaches the store under the pager's write-back policy.

use crate::btree::{BPlusTree, NodeResolver, RootBinding, RootListener};
use crate::codec::Codec;
use crate::error::Result;
use crate::header::HEADER_PAGE_ID;
use crate::node::Node;
use crate::node_header::LeafNodeHeader;
use crate::pager::{PageId, Pager};
use crate::serializer::NodeSerializer;

/// Resolves node ids as page ids through a borrowed [`Pager`].
pub struct PagedNodes<'p, KC, VC> {
    pager: &'p mut Pager,
    serializer: NodeSerializer<KC, VC>,
}

impl<'p, KC: Codec, VC: Codec> PagedNodes<'p, KC, VC> {
    pub fn new(pager: &'p mut Pager, key_codec: KC, value_codec: VC) -> Self {
        let serializer = NodeSerializer::new(key_codec, value_codec, pager.page_size());
        Self { pager, serializer }
    }
}

impl<KC: Codec, VC: Codec> NodeResolver<KC::Item, VC::Item> for PagedNodes<'_, KC, VC> {
    fn fetch(&mut self, page_id: PageId) -> Result<Node<KC::Item, VC::Item>> {
        let page = self.pager.get_page(page_id)?;
        self.serializer.deserialize(page_id, page.data())
    }

    fn persist(&mut self, node: Node<KC::Item, VC::Item>) -> Result<()> {
        let bytes = self.serializer.serialize(&node)?;
        self.pager.get_page(node.page_id())?.overwrite(&bytes);
        Ok(())
    }

    fn allocate(&mut self) -> Result<PageId> {
        let page_id = self.pager.allocate_page()?;
        if page_id == HEADER_PAGE_ID {
            return self.pager.allocate_page();
        }
        Ok(page_id)
    }

    fn contains(&self, page_id: PageId) -> bool {
        page_id != HEADER_PAGE_ID && self.pager.page_exists(page_id)
    }

    fn check(&self, node: &Node<KC::Item, VC::Item>) -> Result<()> {
        self.serializer.serialize(node).map(drop)
    }

    fn release(&mut self, page_id: PageId) -> Result<()> {
        self.pager.release_page(page_id).map(drop)
    }
}

/// Allocate a page and write an empty leaf into it, so the page counts
/// towards the store length once flushed and is never handed out again.
///
/// Works for any key and value codec: an empty leaf is only a header.
pub fn allocate_empty_root(pager: &mut Pager) -> Result<PageId> {
    let mut page_id = pager.allocate_page()?;
    if page_id == HEADER_PAGE_ID {
        page_id = pager.allocate_page()?;
    }
    LeafNodeHeader::new(0, 0, 0, 0).write_to(pager.get_page(page_id)?.data_mut())?;
    Ok(page_id)
}

/// A B+tree stored in pages of a borrowed pager.
pub type PersistedBPlusTree<'p, KC, VC> =
    BPlusTree<<KC as Codec>::Item, <VC as Codec>::Item, PagedNodes<'p, KC, VC>>;

impl<'p, KC, VC> BPlusTree<KC::Item, VC::Item, PagedNodes<'p, KC, VC>>
where
    KC: Codec,
    VC: Codec,
    KC::Item: Ord + Clone,
    VC::Item: Clone,
{
    /// Open the tree rooted at `root_page_id`, or create an empty one when
    /// that page does not exist yet (0 always means "create").
    pub fn open(
        pager: &'p mut Pager,
        key_codec: KC,
        value_codec: VC,
        root_page_id: PageId,
        degree: usize,
    ) -> Result<Self> {
        let nodes = PagedNodes::new(pager, key_codec, value_codec);
        Self::from_resolver(nodes, root_page_id, degree, None)
    }

    /// Like [`open`](Self::open), reporting every root change of the tree
    /// named `tree_name` to `listener`, including the root created here.
    pub fn open_with_listener(
        pager: &'p mut Pager,
        key_codec: KC,
        value_codec: VC,
        root_page_id: PageId,
        degree: usize,
        tree_name: impl Into<String>,
        listener: impl RootListener + 'static,
    ) -> Result<Self> {
        let nodes = PagedNodes::new(pager, key_codec, value_codec);
        let binding = RootBinding::new(tree_name, listener);
        Self::from_resolver(nodes, root_page_id, degree, Some(binding))
    }
}
