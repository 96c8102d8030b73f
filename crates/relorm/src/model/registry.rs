use super::{Model, ModelDef, ModelInner};
use crate::error::{OrmError, OrmResult};
use crate::value::{OrderedMap, Value, ValueMap};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolved model types, keyed by name.
///
/// Built once from [`ModelDef`]s; inheritance is merged at build time so
/// lookups never walk the parent chain again.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: HashMap<String, Model>,
}

/// Collects definitions for [`Registry::builder`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    defs: Vec<ModelDef>,
}

impl RegistryBuilder {
    pub fn register(mut self, def: ModelDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Validate every cross reference and resolve inheritance.
    pub fn build(self) -> OrmResult<Registry> {
        let mut defs: HashMap<String, ModelDef> = HashMap::with_capacity(self.defs.len());
        for def in self.defs {
            if defs.contains_key(&def.name) {
                return Err(OrmError::configuration(format!(
                    "model {} registered twice",
                    def.name
                )));
            }
            defs.insert(def.name.clone(), def);
        }

        for def in defs.values() {
            validate(def, &defs)?;
        }

        let mut models = HashMap::with_capacity(defs.len());
        for name in defs.keys() {
            let lineage = lineage(name, &defs)?;
            models.insert(name.clone(), resolve(&lineage));
        }
        Ok(Registry { models })
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn new(defs: impl IntoIterator<Item = ModelDef>) -> OrmResult<Self> {
        defs.into_iter()
            .fold(Self::builder(), RegistryBuilder::register)
            .build()
    }

    pub fn get(&self, name: &str) -> Option<Model> {
        self.models.get(name).cloned()
    }

    /// Like [`get`](Self::get), but an unknown name is a configuration error.
    pub fn model(&self, name: &str) -> OrmResult<Model> {
        self.get(name)
            .ok_or_else(|| OrmError::configuration(format!("unknown model {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

fn validate(def: &ModelDef, defs: &HashMap<String, ModelDef>) -> OrmResult<()> {
    let known = |model: &str, what: &str| -> OrmResult<()> {
        if defs.contains_key(model) {
            Ok(())
        } else {
            Err(OrmError::configuration(format!(
                "model {} {what} unknown model {model}",
                def.name
            )))
        }
    };
    if let Some(parent) = &def.extends {
        known(parent, "extends")?;
    }
    for (name, has_a) in def.has_a.iter() {
        known(&has_a.target.model, &format!("has-a {name} references"))?;
    }
    for (name, chain) in def.has_many.iter() {
        if chain.links.is_empty() {
            return Err(OrmError::configuration(format!(
                "model {} has-many {name} has an empty chain",
                def.name
            )));
        }
        for link in &chain.links {
            known(&link.model, &format!("has-many {name} references"))?;
        }
    }
    for is_a in &def.is_a {
        known(&is_a.target.model, "is-a references")?;
    }
    Ok(())
}

/// `name` and its parents, most derived first.
fn lineage<'a>(name: &str, defs: &'a HashMap<String, ModelDef>) -> OrmResult<Vec<&'a ModelDef>> {
    let mut out: Vec<&ModelDef> = Vec::new();
    let mut current = Some(name);
    while let Some(name) = current {
        let def = defs
            .get(name)
            .ok_or_else(|| OrmError::configuration(format!("unknown model {name}")))?;
        if out.iter().any(|d| d.name == def.name) {
            return Err(OrmError::configuration(format!(
                "inheritance cycle through model {name}"
            )));
        }
        out.push(def);
        current = def.extends.as_deref();
    }
    Ok(out)
}

fn resolve(lineage: &[&ModelDef]) -> Model {
    let leaf = lineage[0];
    let primary_key = lineage
        .iter()
        .find_map(|d| d.primary_key.clone())
        .unwrap_or_else(|| "id".to_string());

    let mut fields = ValueMap::new();
    fields.insert(primary_key.clone(), Value::Int(0));
    let mut has_a = OrderedMap::new();
    let mut has_many = OrderedMap::new();
    let mut getters = HashMap::new();
    let mut setters = HashMap::new();
    for def in lineage.iter().rev() {
        fields.merge(def.fields.clone());
        has_a.merge(def.has_a.clone());
        has_many.merge(def.has_many.clone());
        getters.extend(def.getters.iter().map(|(k, v)| (k.clone(), v.clone())));
        setters.extend(def.setters.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let mut is_a = Vec::new();
    for def in lineage {
        for entry in &def.is_a {
            if !is_a.iter().any(|e: &super::IsA| e.column == entry.column) {
                is_a.push(entry.clone());
            }
        }
    }

    Model(Arc::new(ModelInner {
        name: leaf.name.clone(),
        table: lineage.iter().find_map(|d| d.table.clone()),
        primary_key,
        strict: lineage.iter().find_map(|d| d.strict).unwrap_or(false),
        parent: leaf.extends.clone(),
        fields,
        has_a,
        has_many,
        is_a,
        getters,
        setters,
        transform: lineage.iter().find_map(|d| d.transform.clone()),
        ancestors: lineage.iter().map(|d| d.name.clone()).collect(),
    }))
}
