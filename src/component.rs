//! Components
use crate::*;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// A stable identifier for a [`Component`] inside whatever tree currently
/// owns it.
///
/// Backed by the node's `Rc` pointer identity rather than a separate arena
/// slot, per spec.md §9's design note: "store a non-owning handle ... so
/// that destroying a component is clean and cycles do not leak."
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct ComponentId(usize);

impl ComponentId {
    fn of(node: &Rc<RefCell<ComponentNode>>) -> Self {
        ComponentId(Rc::as_ptr(node) as *const () as usize)
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({:#x})", self.0)
    }
}

pub(crate) struct ComponentNode {
    pub(crate) name: String,
    pub(crate) channel: Channel,
    /// `Rc`-wrapped so dispatch can clone a handler out and release its
    /// borrow of this node *before* invoking the callback — a handler that
    /// fires a new event against its own (root) component would otherwise
    /// try to re-borrow this same `RefCell` while it was still held.
    pub(crate) handlers: Vec<Rc<HandlerSpec>>,
    pub(crate) generator: Option<Box<dyn FnMut() -> Vec<Event>>>,
    pub(crate) parent: Option<Weak<RefCell<ComponentNode>>>,
    pub(crate) children: Vec<Rc<RefCell<ComponentNode>>>,
    /// Cached pointer to whichever node is currently the root of this
    /// node's tree (itself, if this node is a root). Recomputed across the
    /// whole subtree on `register`/`unregister` (spec.md §4.1).
    root: Weak<RefCell<ComponentNode>>,
    /// Present iff this node is currently a root (spec.md §3 invariant:
    /// "any component becomes a manager when it has no parent").
    pub(crate) manager: Option<ManagerState>,
}

/// A node in the composition tree.
///
/// Owns a channel, a table of handler declarations, and (transitively,
/// through the tree) its children. A `Component` with no parent is, by
/// spec.md §3's invariant, itself the manager of its tree — see
/// [`Component::fire`], [`Component::tick`], [`Component::run`].
pub struct Component(Rc<RefCell<ComponentNode>>);

impl Clone for Component {
    fn clone(&self) -> Self {
        Component(Rc::clone(&self.0))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.0.borrow();
        f.debug_struct("Component")
            .field("name", &node.name)
            .field("channel", &node.channel)
            .field("handlers", &node.handlers.len())
            .field("children", &node.children.len())
            .field("is_root", &node.parent.is_none())
            .finish()
    }
}

impl Component {
    /// Creates a fresh, unattached component — by spec.md §3's invariant,
    /// this makes it the root (manager) of a brand-new single-node tree.
    pub fn new(name: impl Into<String>, channel: impl Into<Channel>) -> Self {
        let node = Rc::new(RefCell::new(ComponentNode {
            name: name.into(),
            channel: channel.into(),
            handlers: Vec::new(),
            generator: None,
            parent: None,
            children: Vec::new(),
            root: Weak::new(),
            manager: Some(ManagerState::new()),
        }));
        node.borrow_mut().root = Rc::downgrade(&node);
        Component(node)
    }

    /// Declares a handler on this component, consuming the builder.
    ///
    /// Must be called before the component is registered under a parent
    /// (spec.md §9: handlers are declared "by builder calls at
    /// construction").
    pub fn handler(self, spec: HandlerSpec) -> Self {
        let id = self.id();
        {
            let mut node = self.0.borrow_mut();
            node.handlers.push(Rc::new(spec));
            // A still-unregistered component is its own root (spec.md §3):
            // keep its own registry in sync so `fire`/`tick` work on it
            // directly, without requiring a `register` call first.
            let ComponentNode {
                manager,
                channel,
                handlers,
                ..
            } = &mut *node;
            if let Some(manager) = manager.as_mut() {
                manager.registry.remove_component(id);
                manager.registry.add_node(id, channel, handlers);
                manager.nodes.insert(id, Rc::downgrade(&self.0));
            }
        }
        self
    }

    /// Installs a `generate_events` producer (spec.md §6): called once per
    /// tick, its returned events are enqueued on this component's channel.
    pub fn with_generator(self, generator: impl FnMut() -> Vec<Event> + 'static) -> Self {
        self.0.borrow_mut().generator = Some(Box::new(generator));
        self
    }

    /// This component's stable identifier.
    pub fn id(&self) -> ComponentId {
        ComponentId::of(&self.0)
    }

    /// This component's name (used only for diagnostics/error messages;
    /// not part of routing).
    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// This component's default channel.
    pub fn channel(&self) -> Channel {
        self.0.borrow().channel.clone()
    }

    /// Is this component currently the root (manager) of its tree?
    pub fn is_root(&self) -> bool {
        self.0.borrow().parent.is_none()
    }

    fn root_node(&self) -> Rc<RefCell<ComponentNode>> {
        self.0
            .borrow()
            .root
            .upgrade()
            .expect("a component always has a live root")
    }

    /// Returns `true` if `other` is this component itself or lies anywhere
    /// in its subtree.
    fn contains(&self, other: &Component) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        self.0
            .borrow()
            .children
            .iter()
            .any(|child| Component(Rc::clone(child)).contains(other))
    }

    /// Collects this node and every descendant, in pre-order.
    fn collect_subtree(&self) -> Vec<Rc<RefCell<ComponentNode>>> {
        let mut out = vec![Rc::clone(&self.0)];
        let children: Vec<_> = self.0.borrow().children.iter().cloned().collect();
        for child in children {
            out.extend(Component(child).collect_subtree());
        }
        out
    }

    /// Attaches this component (and its subtree) under `parent`.
    ///
    /// Fails with [`RegistrationError::AlreadyRegistered`] if this
    /// component already has a parent, or
    /// [`RegistrationError::Cycle`] if `parent` is this component or a
    /// descendant of it.
    pub fn register(&self, parent: &Component) -> Result<(), RegistrationError> {
        if self.0.borrow().parent.is_some() {
            return Err(RegistrationError::AlreadyRegistered(self.name()));
        }
        if self.contains(parent) {
            return Err(RegistrationError::Cycle {
                child: self.name(),
                parent: parent.name(),
            });
        }

        let new_root = parent.root_node();
        let subtree = self.collect_subtree();

        let old_manager = self.0.borrow_mut().manager.take();

        {
            let mut new_root_mut = new_root.borrow_mut();
            let manager = new_root_mut
                .manager
                .as_mut()
                .expect("root always has a manager");
            for node in &subtree {
                let node_ref = node.borrow();
                let id = ComponentId::of(node);
                manager.registry.add_node(id, &node_ref.channel, &node_ref.handlers);
                manager.nodes.insert(id, Rc::downgrade(node));
            }
            if let Some(old) = old_manager {
                manager.queue.extend(old.queue);
            }
        }

        for node in &subtree {
            node.borrow_mut().root = Rc::downgrade(&new_root);
        }

        self.0.borrow_mut().parent = Some(Rc::downgrade(&parent.0));
        parent.0.borrow_mut().children.push(Rc::clone(&self.0));

        log::info!("registered {:?} under {:?}", self.name(), parent.name());

        let event = Event::new("registered")
            .arg(self.name())
            .arg(parent.name())
            .channel(Channel::ANY)
            .build();
        Manager::enqueue(&new_root, event, [Channel::ANY].into_iter().collect());

        Ok(())
    }

    /// Detaches this component from its parent. A no-op if it is already a
    /// root.
    pub fn unregister(&self) {
        let former_parent = match self.0.borrow().parent.clone() {
            Some(weak) => weak.upgrade(),
            None => return,
        };
        let Some(former_parent) = former_parent else {
            return;
        };

        let old_root = self.root_node();
        let subtree = self.collect_subtree();

        {
            let mut old_root_mut = old_root.borrow_mut();
            let manager = old_root_mut
                .manager
                .as_mut()
                .expect("root always has a manager");
            for node in &subtree {
                manager.registry.remove_component(ComponentId::of(node));
            }
        }

        former_parent
            .borrow_mut()
            .children
            .retain(|c| !Rc::ptr_eq(c, &self.0));
        self.0.borrow_mut().parent = None;

        let mut fresh = ManagerState::new();
        for node in &subtree {
            let node_ref = node.borrow();
            let id = ComponentId::of(node);
            fresh.registry.add_node(id, &node_ref.channel, &node_ref.handlers);
            fresh.nodes.insert(id, Rc::downgrade(node));
        }
        self.0.borrow_mut().manager = Some(fresh);
        for node in &subtree {
            node.borrow_mut().root = Rc::downgrade(&self.0);
        }

        let former_parent_name = former_parent.borrow().name.clone();
        log::info!("unregistered {:?} from {:?}", self.name(), former_parent_name);

        let event = Event::new("unregistered")
            .arg(self.name())
            .arg(former_parent_name)
            .channel(Channel::ANY)
            .build();
        Manager::enqueue(&old_root, event, [Channel::ANY].into_iter().collect());
    }

    /// Enqueues `event` on this component's tree, targeted at the explicit
    /// `channels` if any, else the event's own channels if any, else this
    /// component's default channel (spec.md §4.1). Returns the event's
    /// [`Value`]; never blocks.
    pub fn fire(&self, event: Event, channels: impl IntoIterator<Item = Channel>) -> Value {
        let explicit: ChannelSet = channels.into_iter().collect();
        let targets = if !explicit.is_empty() {
            explicit
        } else if !event.channels().is_empty() {
            event.channels().clone()
        } else {
            std::iter::once(self.channel()).collect()
        };

        let root = self.root_node();
        Manager::enqueue(&root, event, targets)
    }

    /// Synonym for [`Component::fire`], retained for the legacy surface
    /// (spec.md §4.1: "`push(event, channel)` — synonym for `fire`").
    pub fn push(&self, event: Event, channel: Channel) -> Value {
        self.fire(event, [channel])
    }

    /// Runs one tick of this component's manager (must be a root). See
    /// [`Manager`].
    pub fn tick(&self) -> bool {
        let root = self.root_node();
        Manager::tick_root(&root)
    }

    /// Runs this component's manager's event loop until stopped. See
    /// [`Manager`].
    pub fn run(&self) {
        let root = self.root_node();
        Manager::run_root(&root);
    }

    /// Stops this component's manager. See [`Manager`].
    pub fn stop(&self) {
        let root = self.root_node();
        root.borrow_mut()
            .manager
            .as_mut()
            .expect("root always has a manager")
            .running = false;
    }

    pub(crate) fn node(&self) -> &Rc<RefCell<ComponentNode>> {
        &self.0
    }
}

/// `a + b`: logical union — creates a new anonymous root owning both `a`
/// and `b` (spec.md §4.1). Panics if either operand already has a parent,
/// since `+` is meant for assembling fresh trees inline.
impl std::ops::Add for Component {
    type Output = Component;

    fn add(self, other: Component) -> Component {
        let root = Component::new("+", Channel::ANY);
        self.register(&root)
            .expect("a + b: left operand must not already have a parent");
        other
            .register(&root)
            .expect("a + b: right operand must not already have a parent");
        root
    }
}

/// `a += b`: registers `b` under `a` (spec.md §4.1). Panics on the same
/// conditions as [`Component::register`].
impl std::ops::AddAssign<Component> for Component {
    fn add_assign(&mut self, other: Component) {
        other
            .register(self)
            .expect("a += b: b must not already have a parent, and a must not be its descendant");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_component_is_its_own_root() {
        let c = Component::new("a", Channel::ANY);
        assert!(c.is_root());
    }

    #[test]
    fn register_attaches_and_clears_root_status() {
        let parent = Component::new("parent", Channel::ANY);
        let child = Component::new("child", Channel::new("echo"));
        child.register(&parent).unwrap();
        assert!(!child.is_root());
        assert!(parent.is_root());
    }

    #[test]
    fn register_twice_fails_already_registered() {
        let a = Component::new("a", Channel::ANY);
        let b = Component::new("b", Channel::ANY);
        let c = Component::new("c", Channel::ANY);
        b.register(&a).unwrap();
        let err = b.register(&c).unwrap_err();
        matches!(err, RegistrationError::AlreadyRegistered(_));
    }

    #[test]
    fn register_under_own_descendant_fails_cycle() {
        let a = Component::new("a", Channel::ANY);
        let b = Component::new("b", Channel::ANY);
        b.register(&a).unwrap();
        let err = a.register(&b).unwrap_err();
        matches!(err, RegistrationError::Cycle { .. });
    }

    #[test]
    fn unregister_is_noop_on_root() {
        let a = Component::new("a", Channel::ANY);
        a.unregister();
        assert!(a.is_root());
    }

    #[test]
    fn unregister_detaches_and_becomes_root_again() {
        let parent = Component::new("parent", Channel::ANY);
        let child = Component::new("child", Channel::ANY);
        child.register(&parent).unwrap();
        child.unregister();
        assert!(child.is_root());
    }

    #[test]
    fn plus_operator_creates_shared_root() {
        let a = Component::new("a", Channel::ANY);
        let b = Component::new("b", Channel::ANY);
        let root = a + b;
        assert!(root.is_root());
    }
}
