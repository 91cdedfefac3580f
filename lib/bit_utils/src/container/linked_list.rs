use core::cell::Cell;
use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Link pointers embedded in a node of a [`LinkedList`]
/// 
/// The links use interior mutability so a node can be linked and unlinked through a shared reference,
/// the list that owns the link is responsible for synchronizing access to it
pub struct ListLink<T> {
    prev: Cell<Option<NonNull<T>>>,
    next: Cell<Option<NonNull<T>>>,
    linked: Cell<bool>,
}

impl<T> ListLink<T> {
    pub const fn new() -> Self {
        ListLink {
            prev: Cell::new(None),
            next: Cell::new(None),
            linked: Cell::new(false),
        }
    }

    /// Returns true if this link is currently part of a list
    pub fn is_linked(&self) -> bool {
        self.linked.get()
    }
}

impl<T> Default for ListLink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for ListLink<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListLink")
            .field("prev", &self.prev.get())
            .field("next", &self.next.get())
            .field("linked", &self.linked.get())
            .finish()
    }
}

unsafe impl<T> Send for ListLink<T> {}

/// Marker used by nodes which are only ever part of one kind of list
#[derive(Debug)]
pub struct DefaultTag;

/// A node which can be part of a [`LinkedList`]
/// 
/// A type which must be part of multiple lists at once implements this trait once per list, using a different `Tag` for each
pub trait ListNode<Tag = DefaultTag>: Sized {
    fn list_link(&self) -> &ListLink<Self>;

    fn prev(&self) -> Option<NonNull<Self>> {
        self.list_link().prev.get()
    }

    fn next(&self) -> Option<NonNull<Self>> {
        self.list_link().next.get()
    }

    fn is_linked(&self) -> bool {
        self.list_link().is_linked()
    }
}

/// An intrusive linked list which doesn't require allocation
/// 
/// The list does not own its nodes, callers guarantee that every node stays alive
/// and does not move for as long as it is linked
pub struct LinkedList<T: ListNode<Tag>, Tag = DefaultTag> {
    start: Option<NonNull<T>>,
    end: Option<NonNull<T>>,
    len: usize,
    _tag: PhantomData<Tag>,
}

impl<T: ListNode<Tag>, Tag> LinkedList<T, Tag> {
    pub const fn new() -> Self {
        LinkedList {
            start: None,
            end: None,
            len: 0,
            _tag: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn front(&self) -> Option<NonNull<T>> {
        self.start
    }

    pub fn back(&self) -> Option<NonNull<T>> {
        self.end
    }

    /// Pushes `node` to the end of the list
    /// 
    /// # Safety
    /// 
    /// `node` must be valid and not already linked in a list using `Tag`,
    /// and it must not move or be dropped until it is removed from this list
    pub unsafe fn push(&mut self, node: NonNull<T>) {
        let link = unsafe { node.as_ref().list_link() };
        assert!(!link.is_linked(), "node is already linked into a list");

        link.prev.set(self.end);
        link.next.set(None);
        link.linked.set(true);

        match self.end {
            Some(end) => unsafe { end.as_ref().list_link().next.set(Some(node)) },
            None => self.start = Some(node),
        }
        self.end = Some(node);
        self.len += 1;
    }

    /// Pushes `node` to the start of the list
    /// 
    /// # Safety
    /// 
    /// same requirements as [`LinkedList::push`]
    pub unsafe fn push_front(&mut self, node: NonNull<T>) {
        let link = unsafe { node.as_ref().list_link() };
        assert!(!link.is_linked(), "node is already linked into a list");

        link.prev.set(None);
        link.next.set(self.start);
        link.linked.set(true);

        match self.start {
            Some(start) => unsafe { start.as_ref().list_link().prev.set(Some(node)) },
            None => self.end = Some(node),
        }
        self.start = Some(node);
        self.len += 1;
    }

    /// Removes `node` from the list
    /// 
    /// # Safety
    /// 
    /// `node` must currently be linked into this list
    pub unsafe fn remove(&mut self, node: NonNull<T>) {
        let link = unsafe { node.as_ref().list_link() };
        assert!(link.is_linked(), "node is not linked into a list");

        let prev = link.prev.get();
        let next = link.next.get();

        match prev {
            Some(prev) => unsafe { prev.as_ref().list_link().next.set(next) },
            None => self.start = next,
        }

        match next {
            Some(next) => unsafe { next.as_ref().list_link().prev.set(prev) },
            None => self.end = prev,
        }

        link.prev.set(None);
        link.next.set(None);
        link.linked.set(false);
        self.len -= 1;
    }

    pub fn pop_front(&mut self) -> Option<NonNull<T>> {
        let node = self.start?;
        // safety: start is always a linked node of this list
        unsafe { self.remove(node) };
        Some(node)
    }

    pub fn pop(&mut self) -> Option<NonNull<T>> {
        let node = self.end?;
        // safety: end is always a linked node of this list
        unsafe { self.remove(node) };
        Some(node)
    }

    /// Appends all elements from `other` linked list to this linked list
    pub fn append(&mut self, other: &mut LinkedList<T, Tag>) {
        if other.is_empty() {
            return;
        }

        match self.end {
            Some(end) => unsafe {
                end.as_ref().list_link().next.set(other.start);
                // panic safety: other is not empty so it has a start
                other.start.unwrap().as_ref().list_link().prev.set(Some(end));
            },
            None => self.start = other.start,
        }

        self.end = other.end;
        self.len += other.len;

        other.start = None;
        other.end = None;
        other.len = 0;
    }

    pub fn iter(&self) -> Iter<'_, T, Tag> {
        Iter {
            next: self.start,
            len: self.len,
            marker: PhantomData,
        }
    }
}

impl<T: ListNode<Tag>, Tag> Default for LinkedList<T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ListNode<Tag> + Debug, Tag> Debug for LinkedList<T, Tag> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

unsafe impl<T: ListNode<Tag> + Send, Tag> Send for LinkedList<T, Tag> {}

impl<'a, T: ListNode<Tag>, Tag> IntoIterator for &'a LinkedList<T, Tag> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// NOTE: the current element may be removed from the list while iterating, the iterator has already read its successor
pub struct Iter<'a, T: ListNode<Tag>, Tag = DefaultTag> {
    next: Option<NonNull<T>>,
    len: usize,
    marker: PhantomData<(&'a T, Tag)>,
}

impl<'a, T: ListNode<Tag>, Tag> Iterator for Iter<'a, T, Tag> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            None
        } else {
            let out = unsafe { self.next?.as_ref() };
            self.next = out.next();
            self.len -= 1;
            Some(out)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: ListNode<Tag>, Tag> ExactSizeIterator for Iter<'_, T, Tag> {}
impl<T: ListNode<Tag>, Tag> core::iter::FusedIterator for Iter<'_, T, Tag> {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        value: usize,
        first: ListLink<Node>,
        second: ListLink<Node>,
    }

    struct SecondTag;

    impl Node {
        fn new(value: usize) -> Self {
            Node {
                value,
                first: ListLink::new(),
                second: ListLink::new(),
            }
        }
    }

    impl ListNode for Node {
        fn list_link(&self) -> &ListLink<Self> {
            &self.first
        }
    }

    impl ListNode<SecondTag> for Node {
        fn list_link(&self) -> &ListLink<Self> {
            &self.second
        }
    }

    fn values<Tag>(list: &LinkedList<Node, Tag>) -> [usize; 4] where Node: ListNode<Tag> {
        let mut out = [0; 4];
        for (i, node) in list.iter().enumerate() {
            out[i] = node.value;
        }
        out
    }

    #[test]
    fn push_remove_order() {
        let nodes = [Node::new(1), Node::new(2), Node::new(3)];
        let mut list: LinkedList<Node> = LinkedList::new();

        unsafe {
            list.push(NonNull::from(&nodes[1]));
            list.push(NonNull::from(&nodes[2]));
            list.push_front(NonNull::from(&nodes[0]));
        }
        assert_eq!(list.len(), 3);
        assert_eq!(values(&list), [1, 2, 3, 0]);

        unsafe { list.remove(NonNull::from(&nodes[1])) };
        assert!(!ListNode::<DefaultTag>::is_linked(&nodes[1]));
        assert_eq!(values(&list), [1, 3, 0, 0]);

        assert_eq!(list.pop_front(), Some(NonNull::from(&nodes[0])));
        assert_eq!(list.pop(), Some(NonNull::from(&nodes[2])));
        assert!(list.is_empty());
    }

    #[test]
    fn node_in_two_lists() {
        let nodes = [Node::new(1), Node::new(2)];
        let mut first: LinkedList<Node> = LinkedList::new();
        let mut second: LinkedList<Node, SecondTag> = LinkedList::new();

        unsafe {
            first.push(NonNull::from(&nodes[0]));
            first.push(NonNull::from(&nodes[1]));
            second.push(NonNull::from(&nodes[1]));
        }

        assert_eq!(values(&first), [1, 2, 0, 0]);
        assert_eq!(values(&second), [2, 0, 0, 0]);

        unsafe { first.remove(NonNull::from(&nodes[1])) };
        assert!(ListNode::<SecondTag>::is_linked(&nodes[1]));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn append_moves_everything() {
        let nodes = [Node::new(1), Node::new(2), Node::new(3)];
        let mut a: LinkedList<Node> = LinkedList::new();
        let mut b: LinkedList<Node> = LinkedList::new();

        unsafe {
            a.push(NonNull::from(&nodes[0]));
            b.push(NonNull::from(&nodes[1]));
            b.push(NonNull::from(&nodes[2]));
        }

        a.append(&mut b);
        assert!(b.is_empty());
        assert_eq!(values(&a), [1, 2, 3, 0]);
        assert_eq!(a.back(), Some(NonNull::from(&nodes[2])));
    }
}
