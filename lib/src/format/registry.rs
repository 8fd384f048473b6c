use indexmap::IndexMap;

use crate::format::{
    cmdl::{ModelHandler, K_FORM_CMDL, K_FORM_SMDL, K_FORM_WMDL},
    handler::{AssetHandler, HandlerFactory, InertHandler},
    txtr::{TextureHandler, K_FORM_TXTR},
    FourCC,
};

const BUILTIN_HANDLERS: &[(FourCC, HandlerFactory)] = &[
    (K_FORM_CMDL, ModelHandler::create),
    (K_FORM_SMDL, ModelHandler::create),
    (K_FORM_WMDL, ModelHandler::create),
    (K_FORM_TXTR, TextureHandler::create),
];

/// Maps type codes to handler factories.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    factories: IndexMap<FourCC, HandlerFactory>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for &(kind, factory) in BUILTIN_HANDLERS {
            registry.register(kind, factory);
        }
        registry
    }
}

impl TypeRegistry {
    /// A registry with no entries; every type resolves to the inert handler.
    pub fn empty() -> Self { Self { factories: IndexMap::new() } }

    /// Adds or replaces the factory for `kind`, returning the previous one.
    pub fn register(&mut self, kind: FourCC, factory: HandlerFactory) -> Option<HandlerFactory> {
        self.factories.insert(kind, factory)
    }

    #[inline]
    pub fn resolve(&self, kind: FourCC) -> Option<HandlerFactory> {
        self.factories.get(&kind).copied()
    }

    /// Instantiates the handler for `kind`, falling back to [`InertHandler`].
    pub fn create(&self, kind: FourCC) -> Box<dyn AssetHandler> {
        match self.resolve(kind) {
            Some(factory) => factory(),
            None => {
                log::debug!("No handler registered for {kind:?}");
                InertHandler::create()
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FourCC, HandlerFactory)> + '_ {
        self.factories.iter().map(|(&kind, &factory)| (kind, factory))
    }

    #[inline]
    pub fn len(&self) -> usize { self.factories.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.factories.is_empty() }
}
