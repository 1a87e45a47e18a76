/*!
 * Typed handles over remote entities
 *
 * A wrapper owns exactly one remote payload. Its identity is the remote id:
 * two wrappers of the same type are equal iff their ids are equal, and the
 * natural ordering is by id ascending. Every list of remote entities handed to
 * callers passes through [`wrap`], so callers never see the server's
 * arbitrary ordering.
 */

use omero_gateway_interface::{Id, ObjectKind, ObjectRef, RemoteObject};
use regex::Regex;

use crate::error::{OmeroError, Result};
use crate::session::Session;

/// Common contract of every entity wrapper
pub trait EntityWrapper: Sized {
    /// Payload type owned by the wrapper
    type Data: Clone;

    /// Remote kind of the wrapped entity
    const KIND: ObjectKind;

    fn from_data(data: Self::Data) -> Self;

    fn data(&self) -> &Self::Data;

    /// Mutable payload access for setters
    fn data_mut(&mut self) -> &mut Self::Data;

    /// Remote id, `None` until first saved
    fn id(&self) -> Option<Id>;

    /// Store a payload fetched or returned by the server
    ///
    /// The id is assigned on first save and never changes afterwards.
    fn replace_data(&mut self, data: Self::Data);

    /// Unloaded reference to the entity; fails if it was never saved
    fn object_ref(&self) -> Result<ObjectRef> {
        self.id()
            .map(|id| ObjectRef::new(Self::KIND, id))
            .ok_or_else(|| {
                OmeroError::precondition(format!("{} has no id: save it first", Self::KIND))
            })
    }
}

/// Wrappers whose payload the data manager can save and delete
pub trait Persistent: EntityWrapper {
    fn to_remote(&self) -> RemoteObject;

    /// Take over the payload the server returned from a save
    fn absorb(&mut self, saved: RemoteObject) -> Result<()>;

    /// Clean-up that must run before the entity is deleted
    fn prepare_delete(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    /// Persist the payload and store what the server returned
    fn save_and_update(&mut self, session: &Session) -> Result<()> {
        let saved = session.save(self.to_remote())?;
        self.absorb(saved)
    }
}

/// Shared body of [`Persistent::absorb`]
pub(crate) fn absorb_saved<W>(wrapper: &mut W, saved: RemoteObject) -> Result<()>
where
    W: EntityWrapper,
    W::Data: TryFrom<RemoteObject, Error = RemoteObject>,
{
    let data = W::Data::try_from(saved).map_err(|other| {
        OmeroError::server(format!("Saving {} returned a {}", W::KIND, other.kind()))
    })?;
    wrapper.replace_data(data);
    Ok(())
}

/// Wrappers that carry a display name
pub trait Named {
    fn name(&self) -> &str;
}

/// Wrap raw payloads, sorted ascending by `key`
///
/// The sort is stable: items with equal keys keep the server's order.
pub fn wrap<D, W, K, C, F>(items: impl IntoIterator<Item = D>, constructor: C, mut key: F) -> Vec<W>
where
    C: FnMut(D) -> W,
    F: FnMut(&W) -> K,
    K: Ord,
{
    let mut wrapped: Vec<W> = items.into_iter().map(constructor).collect();
    wrapped.sort_by_key(|w| key(w));
    wrapped
}

/// Wrap raw payloads sorted by remote id
pub fn wrap_by_id<W: EntityWrapper>(items: impl IntoIterator<Item = W::Data>) -> Vec<W> {
    wrap(items, W::from_data, W::id)
}

/// Remove adjacent duplicates by id
///
/// Precondition: `sorted` is non-decreasing in id. This is a linear scan, so
/// duplicates that are not adjacent survive. Use [`sort_and_purge`] on
/// results concatenated from several fetches. Unsaved wrappers have no id
/// and are all kept.
pub fn purge<W: EntityWrapper>(mut sorted: Vec<W>) -> Vec<W> {
    sorted.dedup_by(|a, b| a.id().is_some() && a.id() == b.id());
    sorted
}

/// Sort by id, then drop duplicates
pub fn sort_and_purge<W: EntityWrapper>(mut wrappers: Vec<W>) -> Vec<W> {
    wrappers.sort_by_key(|w| w.id());
    purge(wrappers)
}

/// Sort by display name, keeping id order among equal names
pub fn sort_by_name<W: EntityWrapper + Named>(wrappers: &mut [W]) {
    wrappers.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(&b.id())));
}

/// Keep entities whose name equals `name` exactly
pub fn retain_named<W: Named>(wrappers: &mut Vec<W>, name: &str) {
    wrappers.retain(|w| w.name() == name);
}

/// Keep entities whose name contains a match of the regular expression
pub fn retain_like<W: Named>(wrappers: &mut Vec<W>, pattern: &str) -> Result<()> {
    let regex = Regex::new(pattern)
        .map_err(|e| OmeroError::precondition(format!("Invalid name pattern {:?}: {}", pattern, e)))?;
    wrappers.retain(|w| regex.is_match(w.name()));
    Ok(())
}

/// First element of a result that is expected to be non-empty
pub fn first<W>(wrappers: Vec<W>, what: impl FnOnce() -> String) -> Result<W> {
    wrappers
        .into_iter()
        .next()
        .ok_or_else(|| OmeroError::not_found(what()))
}

/// Identity, ordering and hashing by remote id for a wrapper type
macro_rules! impl_identity {
    ($wrapper:ty) => {
        impl PartialEq for $wrapper {
            fn eq(&self, other: &Self) -> bool {
                $crate::wrapper::EntityWrapper::id(self) == $crate::wrapper::EntityWrapper::id(other)
            }
        }

        impl Eq for $wrapper {}

        impl PartialOrd for $wrapper {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $wrapper {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                $crate::wrapper::EntityWrapper::id(self).cmp(&$crate::wrapper::EntityWrapper::id(other))
            }
        }

        impl std::hash::Hash for $wrapper {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                $crate::wrapper::EntityWrapper::id(self).hash(state);
            }
        }

        impl std::fmt::Display for $wrapper {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let kind = <$wrapper as $crate::wrapper::EntityWrapper>::KIND;
                match $crate::wrapper::EntityWrapper::id(self) {
                    Some(id) => write!(f, "{} {}", kind, id),
                    None => write!(f, "{} (unsaved)", kind),
                }
            }
        }
    };
}

pub(crate) use impl_identity;

/// `EntityWrapper` boilerplate for a wrapper holding its payload in `data`
macro_rules! impl_entity_wrapper {
    ($wrapper:ty, $data:ty, $kind:expr) => {
        impl $crate::wrapper::EntityWrapper for $wrapper {
            type Data = $data;
            const KIND: omero_gateway_interface::ObjectKind = $kind;

            fn from_data(data: $data) -> Self {
                Self::new(data)
            }

            fn data(&self) -> &$data {
                &self.data
            }

            fn data_mut(&mut self) -> &mut $data {
                &mut self.data
            }

            fn id(&self) -> Option<omero_gateway_interface::Id> {
                self.data.id
            }

            fn replace_data(&mut self, mut data: $data) {
                if let Some(id) = self.data.id {
                    data.id = Some(id);
                }
                self.data = data;
            }
        }

        $crate::wrapper::impl_identity!($wrapper);
    };
}

pub(crate) use impl_entity_wrapper;
