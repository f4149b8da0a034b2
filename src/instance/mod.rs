//! Instance model
//!
//! An instance is a public block whose only fixed content is its class
//! binding, plus one private block per ancestor declaring instance private
//! data. Every instance holds a reference to a default class for as long as it
//! lives; a floating class bound to it may additionally be owned (sunk).


use crate::allocator::{self, Block};
use crate::class::Class;
use crate::error::{context, fail, MetaError, Result, ResultExt};
use crate::logging::{log_instance_created, log_instance_destroyed};
use crate::signal;
use crate::types::registry::{descriptor, require, TypeDescriptor};
use crate::types::{Type, TypeFlags, INSTANCE_HEADER_SIZE};
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

struct InstanceState {
    alive: bool,
    class: Option<Class>,
    /// Default class referenced on behalf of the bound class's type
    held_default: Option<Class>,
    public: Block,
    privates: SmallVec<[(Type, Block); 4]>,
    in_place: bool,
}

struct InstanceInner {
    id: u64,
    ty: Type,
    state: Mutex<InstanceState>,
}

/// Shared handle to an instance
///
/// Cloning the handle does not extend the instance's life; [`Instance::destroy`]
/// ends it for every handle.
#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);

/// Caller-owned storage for an in-place instance
pub struct InstanceStorage {
    block: Block,
}

impl InstanceStorage {
    pub fn new(size: usize) -> Self {
        Self {
            block: Block::zeroed(size),
        }
    }

    pub fn size(&self) -> usize {
        self.block.size()
    }
}

impl fmt::Debug for InstanceStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceStorage")
            .field("size", &self.block.size())
            .finish()
    }
}

fn check_instantiable(desc: &TypeDescriptor) -> Result<()> {
    if !desc.has(TypeFlags::INSTANTIABLE) {
        return Err(MetaError::invalid_argument(format!(
            "'{}' is not instantiable",
            desc.name
        )));
    }
    if desc.has(TypeFlags::ABSTRACT) {
        return Err(MetaError::invalid_argument(format!(
            "'{}' is abstract",
            desc.name
        )));
    }
    if desc.info.instance_size == 0 {
        return Err(MetaError::Unimplemented(format!(
            "'{}' has a zero-sized instance",
            desc.name
        )));
    }
    Ok(())
}

fn release_blocks(label: &str, public: Option<Block>, privates: SmallVec<[(Type, Block); 4]>) {
    if let Some(public) = public {
        allocator::release(public, label);
    }
    for (_, block) in privates {
        allocator::release(block, label);
    }
}

/// Drop an instance's class binding: tear down an owned floating class, then
/// release the held default reference
fn release_binding(class: Option<Class>, held: Option<Class>) -> Result<()> {
    let mut first = None;
    if let Some(class) = class {
        if class.is_owned() {
            if let Err(err) = class.dispose_owned() {
                first = Some(err);
            }
        }
    }
    if let Some(held) = held {
        if let Err(err) = held.unreference_default() {
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

impl Instance {
    /// New instance of `ty` bound to its default class
    pub fn create(ty: Type) -> Result<Instance> {
        Self::create_with(ty, None, None).recorded()
    }

    /// New instance of `ty` bound to `class`, which must be a class of `ty`
    pub fn create_with_class(ty: Type, class: &Class) -> Result<Instance> {
        Self::create_with(ty, Some(class.clone()), None).recorded()
    }

    /// Instance built over caller storage; types with instance private data
    /// cannot be built in place
    pub fn construct(storage: InstanceStorage, ty: Type, class: Option<&Class>) -> Result<Instance> {
        Self::create_with(ty, class.cloned(), Some(storage.block)).recorded()
    }

    fn create_with(ty: Type, class: Option<Class>, storage: Option<Block>) -> Result<Instance> {
        let desc = require(ty)?;
        let _frame = context::frame(format!("Instance::create({})", desc.name));
        check_instantiable(&desc)?;

        if let Some(class) = &class {
            if class.type_of() != ty {
                return Err(MetaError::mismatch(class.type_of().to_string(), desc.name.to_string()));
            }
            if !class.is_alive() {
                return Err(MetaError::invalid_argument(format!(
                    "class of '{}' was already torn down",
                    desc.name
                )));
            }
        }

        let in_place = storage.is_some();
        if let Some(block) = &storage {
            if desc.instance_private_total > 0 {
                return Err(MetaError::invalid_operation(format!(
                    "'{}' has instance private data and cannot be constructed in place",
                    desc.name
                )));
            }
            if block.size() < desc.info.instance_size {
                return Err(MetaError::invalid_argument(format!(
                    "storage of {} bytes is too small for the {} byte instance of '{}'",
                    block.size(),
                    desc.info.instance_size,
                    desc.name
                )));
            }
        }

        let held = Class::reference_default(ty)?;
        let bound = class.unwrap_or_else(|| held.clone());

        let (public, privates) = match Self::allocate(&desc, storage) {
            Ok(blocks) => blocks,
            Err(err) => {
                let _ = held.unreference_default();
                return Err(err);
            }
        };

        let instance = Instance(Arc::new(InstanceInner {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            ty,
            state: Mutex::new(InstanceState {
                alive: true,
                class: Some(bound),
                held_default: Some(held),
                public,
                privates,
                in_place,
            }),
        }));
        desc.instance_refs.fetch_add(1, Ordering::AcqRel);

        for level in desc.bases.iter().copied() {
            let Some(level_desc) = descriptor(level) else {
                continue;
            };
            if let Some(init) = level_desc.info.instance_init {
                if let Err(err) = init(&instance) {
                    let _ = instance.release();
                    return Err(err);
                }
            }
        }

        log_instance_created(&desc.name, instance.id(), in_place);
        Ok(instance)
    }

    fn allocate(
        desc: &TypeDescriptor,
        storage: Option<Block>,
    ) -> Result<(Block, SmallVec<[(Type, Block); 4]>)> {
        let label = &*desc.name;
        let in_place = storage.is_some();
        let mut public = match storage {
            Some(mut block) => {
                block.reset();
                block
            }
            None => allocator::reserve(desc.info.instance_size, label)?,
        };
        public.carve(0..INSTANCE_HEADER_SIZE);

        let mut privates: SmallVec<[(Type, Block); 4]> = SmallVec::new();
        for level in &desc.bases {
            let size = descriptor(*level).map_or(0, |d| d.info.instance_private_size);
            if size == 0 {
                continue;
            }
            match allocator::reserve(size, label) {
                Ok(block) => privates.push((*level, block)),
                Err(err) => {
                    release_blocks(label, (!in_place).then_some(public), privates);
                    return Err(err);
                }
            }
        }
        Ok((public, privates))
    }

    /// Unbind, drop connections and free storage; returns in-place storage
    fn release(&self) -> Result<Option<Block>> {
        let (class, held, public, privates, in_place) = {
            let mut state = self.state();
            if !state.alive {
                drop(state);
                return Err(MetaError::invalid_operation(format!(
                    "instance #{} was already destroyed",
                    self.id()
                )));
            }
            state.alive = false;
            (
                state.class.take(),
                state.held_default.take(),
                std::mem::replace(&mut state.public, Block::zeroed(0)),
                std::mem::take(&mut state.privates),
                state.in_place,
            )
        };

        signal::remove_instance(self);

        let remaining = match descriptor(self.0.ty) {
            Some(desc) => {
                let previous = desc
                    .instance_refs
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .unwrap_or(0);
                previous.saturating_sub(1)
            }
            None => 0,
        };

        let label = self.0.ty.to_string();
        let result = release_binding(class, held);
        let storage = if in_place {
            release_blocks(&label, None, privates);
            let mut block = public;
            block.reset();
            Some(block)
        } else {
            release_blocks(&label, Some(public), privates);
            None
        };

        log_instance_destroyed(&label, self.id(), remaining);
        result.map(|()| storage)
    }

    /// End a heap instance
    pub fn destroy(&self) -> Result<()> {
        if self.is_in_place() {
            return fail(MetaError::invalid_operation(format!(
                "instance #{} was constructed in place and must be destructed",
                self.id()
            )));
        }
        self.release().map(drop).recorded()
    }

    /// End an in-place instance, returning its storage
    pub fn destruct(&self) -> Result<InstanceStorage> {
        if !self.is_in_place() {
            return fail(MetaError::invalid_operation(format!(
                "instance #{} is heap allocated and must be destroyed",
                self.id()
            )));
        }
        match self.release().recorded()? {
            Some(block) => Ok(InstanceStorage { block }),
            None => fail(MetaError::invalid_operation(format!(
                "instance #{} has no storage to return",
                self.id()
            ))),
        }
    }

    #[inline]
    fn state(&self) -> MutexGuard<'_, InstanceState> {
        self.0.state.lock()
    }

    fn live_class(&self) -> Result<Class> {
        let class = self.state().class.clone();
        class.ok_or_else(|| {
            MetaError::invalid_operation(format!("instance #{} was already destroyed", self.id()))
        })
    }

    /// Process-unique instance id
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_alive(&self) -> bool {
        self.state().alive
    }

    pub fn is_in_place(&self) -> bool {
        self.state().in_place
    }

    /// Bound class; `None` once destroyed
    pub fn class_of(&self) -> Option<Class> {
        self.state().class.clone()
    }

    /// Type of the bound class, or the created type once destroyed
    pub fn type_of(&self) -> Type {
        self.class_of().map_or(self.0.ty, |class| class.type_of())
    }

    /// Public plus private bytes
    pub fn total_size(&self) -> usize {
        let state = self.state();
        state.public.size() + state.privates.iter().map(|(_, b)| b.size()).sum::<usize>()
    }

    pub fn check(&self, ty: Type) -> bool {
        self.type_of().check(ty)
    }

    /// This instance viewed as `ty`; `TypeMismatch` when incompatible
    pub fn cast(&self, ty: Type) -> Result<Instance> {
        match self.try_cast(ty) {
            Some(instance) => Ok(instance),
            None => fail(MetaError::mismatch(self.type_of().to_string(), ty.to_string())),
        }
    }

    pub fn try_cast(&self, ty: Type) -> Option<Instance> {
        self.check(ty).then(|| self.clone())
    }

    /// Rebind to `class`, whose type must be compatible with the current one
    pub fn swizzle_class(&self, class: &Class) -> Result<()> {
        let current = self.live_class().recorded()?;
        if current == *class {
            return Ok(());
        }
        if !class.type_of().check(current.type_of()) {
            return fail(MetaError::mismatch(
                class.type_of().to_string(),
                current.type_of().to_string(),
            ));
        }
        if !class.is_alive() {
            return fail(MetaError::invalid_argument(format!(
                "class of '{}' was already torn down",
                class.type_of()
            )));
        }

        let held = Class::reference_default(class.type_of())?;
        let (old_class, old_held) = {
            let mut state = self.state();
            let old = (state.class.take(), state.held_default.take());
            state.class = Some(class.clone());
            state.held_default = Some(held);
            old
        };
        release_binding(old_class, old_held).recorded()
    }

    /// Give the bound floating class's lifetime to this instance
    pub fn sink_class(&self) -> Result<()> {
        self.live_class().and_then(|class| class.sink()).recorded()
    }

    /// Take the bound class's lifetime back from this instance
    pub fn float_class(&self) -> Result<()> {
        self.live_class().and_then(|class| class.unsink()).recorded()
    }

    pub fn slot<T: Any + Clone>(&self, offset: usize) -> Option<T> {
        self.state().public.get::<T>(offset).cloned()
    }

    pub fn set_slot<T: Any + Send + Sync>(&self, offset: usize, value: T) -> Result<()> {
        let result = {
            let mut state = self.state();
            if state.alive {
                state.public.set(offset, value)
            } else {
                Err(MetaError::invalid_operation(format!(
                    "write to destroyed instance #{}",
                    self.0.id
                )))
            }
        };
        result.map_err(context::record)
    }

    /// Run `f` with exclusive access to the public block; `f` must not call
    /// back into this instance
    pub fn with_public<R>(&self, f: impl FnOnce(&mut Block) -> R) -> R {
        f(&mut self.state().public)
    }

    pub fn private_slot<T: Any + Clone>(&self, level: Type, offset: usize) -> Option<T> {
        let state = self.state();
        state
            .privates
            .iter()
            .find(|(owner, _)| *owner == level)
            .and_then(|(_, block)| block.get::<T>(offset).cloned())
    }

    pub fn set_private_slot<T: Any + Send + Sync>(
        &self,
        level: Type,
        offset: usize,
        value: T,
    ) -> Result<()> {
        self.with_private(level, |block| block.set(offset, value))?
            .map_err(context::record)
    }

    /// Run `f` on `level`'s private block; InvalidArgument when `level`
    /// declares no instance private data in this instance's ancestry
    pub fn with_private<R>(&self, level: Type, f: impl FnOnce(&mut Block) -> R) -> Result<R> {
        let mut state = self.state();
        if let Some((_, block)) = state.privates.iter_mut().find(|(owner, _)| *owner == level) {
            return Ok(f(block));
        }
        drop(state);
        fail(MetaError::invalid_argument(format!(
            "'{level}' has no instance private data in '{}'",
            self.0.ty
        )))
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alive = self.is_alive();
        f.debug_struct("Instance")
            .field("id", &self.0.id)
            .field("type", &self.type_of())
            .field("alive", &alive)
            .finish()
    }
}
