use phf::{Map, phf_map};
use std::path::PathBuf;

pub type Color = [f32; 3];

/// Element colors and display radii keyed by chemical symbol.
static ELEMENT_DEFAULTS: Map<&'static str, (Color, f64)> = phf_map! {
    "H" => ([1.0, 1.0, 1.0], 0.46),
    "He" => ([0.85, 1.0, 1.0], 0.49),
    "Li" => ([0.8, 0.5, 1.0], 1.45),
    "C" => ([0.56, 0.56, 0.56], 0.77),
    "N" => ([0.19, 0.31, 0.97], 0.74),
    "O" => ([1.0, 0.05, 0.05], 0.74),
    "Na" => ([0.67, 0.36, 0.95], 1.91),
    "Mg" => ([0.54, 1.0, 0.0], 1.6),
    "Al" => ([0.75, 0.65, 0.65], 1.43),
    "Si" => ([0.94, 0.78, 0.63], 1.18),
    "K" => ([0.56, 0.25, 0.83], 2.35),
    "Ca" => ([0.24, 1.0, 0.0], 1.97),
    "Ti" => ([0.75, 0.76, 0.78], 1.47),
    "Cr" => ([0.54, 0.6, 0.78], 1.29),
    "Fe" => ([0.88, 0.4, 0.2], 1.26),
    "Co" => ([0.94, 0.56, 0.63], 1.25),
    "Ni" => ([0.31, 0.82, 0.31], 1.25),
    "Cu" => ([0.78, 0.5, 0.2], 1.28),
    "Zn" => ([0.49, 0.5, 0.69], 1.37),
    "Ga" => ([0.76, 0.56, 0.56], 1.53),
    "Ge" => ([0.4, 0.56, 0.56], 1.22),
    "Zr" => ([0.0, 1.0, 0.0], 1.6),
    "Nb" => ([0.45, 0.76, 0.79], 1.46),
    "Mo" => ([0.33, 0.71, 0.71], 1.39),
    "Pd" => ([0.0, 0.41, 0.52], 1.37),
    "Ag" => ([0.75, 0.75, 0.75], 1.44),
    "W" => ([0.13, 0.58, 0.84], 1.39),
    "Pt" => ([0.82, 0.82, 0.88], 1.39),
    "Au" => ([1.0, 0.82, 0.14], 1.44),
    "Pb" => ([0.34, 0.35, 0.38], 1.75),
};

const FALLBACK_PALETTE: [Color; 8] = [
    [0.97, 0.97, 0.97],
    [1.0, 0.4, 0.4],
    [0.4, 0.4, 1.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.4, 1.0],
    [0.4, 1.0, 0.2],
    [0.7, 0.0, 1.0],
    [0.2, 1.0, 1.0],
];

const FALLBACK_RADIUS: f64 = 0.5;

/// A type discovered while parsing a single frame.
///
/// Zero radius or mass means "not specified by the file".
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub id: i32,
    pub name: String,
    pub color: Option<Color>,
    pub radius: f64,
    pub mass: f64,
}

impl TypeDefinition {
    fn new(id: i32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            color: None,
            radius: 0.0,
            mass: 0.0,
        }
    }
}

/// Frame-local list of types referenced by a typed property column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeList {
    types: Vec<TypeDefinition>,
}

impl TypeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &[TypeDefinition] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn find_by_id(&self, id: i32) -> Option<&TypeDefinition> {
        self.types.iter().find(|t| t.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Registers a numeric type id if it has not been seen before.
    pub fn add_type_id(&mut self, id: i32) -> i32 {
        if self.find_by_id(id).is_none() {
            self.types.push(TypeDefinition::new(id, ""));
        }
        id
    }

    /// Registers a named type, assigning the next free id on first encounter.
    pub fn add_type_name(&mut self, name: &str) -> i32 {
        if let Some(existing) = self.find_by_name(name) {
            return existing.id;
        }
        let id = self.types.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        self.types.push(TypeDefinition::new(id, name));
        id
    }

    pub fn set_type_name(&mut self, id: i32, name: &str) {
        if let Some(t) = self.types.iter_mut().find(|t| t.id == id) {
            t.name = name.to_string();
        }
    }

    pub fn set_type_mass(&mut self, id: i32, mass: f64) {
        if let Some(t) = self.types.iter_mut().find(|t| t.id == id) {
            t.mass = mass;
        }
    }

    pub fn sort_by_id(&mut self) {
        self.types.sort_by_key(|t| t.id);
    }

    /// Sorts named types alphabetically and renumbers them from 1.
    ///
    /// Only applies when the ids form the sequence `1..=n` (i.e. they were
    /// handed out in encounter order); `values` is remapped to the new ids.
    pub fn sort_by_name(&mut self, values: &mut [i32]) {
        let consecutive = self
            .types
            .iter()
            .enumerate()
            .all(|(i, t)| t.id == i as i32 + 1);
        if !consecutive {
            return;
        }
        if self.types.windows(2).all(|w| w[0].name <= w[1].name) {
            return;
        }

        self.types.sort_by(|a, b| a.name.cmp(&b.name));
        let mut mapping = vec![0; self.types.len() + 1];
        for (i, t) in self.types.iter_mut().enumerate() {
            mapping[t.id as usize] = i as i32 + 1;
            t.id = i as i32 + 1;
        }
        for v in values.iter_mut() {
            if let Some(&new_id) = usize::try_from(*v).ok().and_then(|k| mapping.get(k)) {
                if new_id != 0 {
                    *v = new_id;
                }
            }
        }
    }

    pub fn has_names(&self) -> bool {
        self.types.iter().any(|t| !t.name.is_empty())
    }
}

/// An entry in the persistent type catalog of a particle or bond collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementType {
    pub id: i32,
    pub name: String,
    pub color: Color,
    pub radius: f64,
    pub mass: f64,
    pub shape_file: Option<PathBuf>,
}

impl ElementType {
    /// Creates an entry with the standard color/radius for its name, falling
    /// back to a palette keyed by the numeric id.
    pub fn with_defaults(id: i32, name: &str) -> Self {
        let (color, radius) = ELEMENT_DEFAULTS.get(name).copied().unwrap_or_else(|| {
            let slot = id.rem_euclid(FALLBACK_PALETTE.len() as i32) as usize;
            (FALLBACK_PALETTE[slot], FALLBACK_RADIUS)
        });
        Self {
            id,
            name: name.to_string(),
            color,
            radius,
            mass: 0.0,
            shape_file: None,
        }
    }

    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("Type {}", self.id)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementTypeCatalog {
    types: Vec<ElementType>,
}

impl ElementTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &[ElementType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn find_by_id(&self, id: i32) -> Option<&ElementType> {
        self.types.iter().find(|t| t.id == id)
    }

    pub fn find_by_id_mut(&mut self, id: i32) -> Option<&mut ElementType> {
        self.types.iter_mut().find(|t| t.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ElementType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn insert(&mut self, element: ElementType) {
        match self.types.iter_mut().find(|t| t.id == element.id) {
            Some(slot) => *slot = element,
            None => self.types.push(element),
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&ElementType) -> bool) {
        self.types.retain(keep);
    }

    /// Smallest id `>= base` that no entry uses yet.
    pub fn unique_id(&self, base: i32) -> i32 {
        let max = self.types.iter().map(|t| t.id).max().unwrap_or(0);
        base.max(max + 1)
    }

    pub fn sort_by_id(&mut self) {
        self.types.sort_by_key(|t| t.id);
    }
}
