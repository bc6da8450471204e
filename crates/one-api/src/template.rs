//! Builder for OpenNebula template text, as accepted by `one.vm.allocate`.

use std::fmt;

/// Well-known template attribute names.
pub mod keys {
    pub const NAME: &str = "NAME";
    pub const CPU: &str = "CPU";
    pub const VCPU: &str = "VCPU";
    pub const MEMORY: &str = "MEMORY";

    pub const DISK: &str = "DISK";
    pub const NIC: &str = "NIC";
    pub const GRAPHICS: &str = "GRAPHICS";
    pub const CONTEXT: &str = "CONTEXT";

    pub const IMAGE: &str = "IMAGE";
    pub const DATASTORE: &str = "DATASTORE";
    pub const DEV_PREFIX: &str = "DEV_PREFIX";
    pub const SIZE: &str = "SIZE";
    pub const NETWORK: &str = "NETWORK";
    pub const MODEL: &str = "MODEL";
    pub const TYPE: &str = "TYPE";
    pub const LISTEN: &str = "LISTEN";

    pub const SSH_PUBLIC_KEY: &str = "SSH_PUBLIC_KEY";
}

/// A VM template: top-level `KEY="value"` attributes followed by vector
/// attributes such as `DISK=[ ... ]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pairs: Vec<(String, String)>,
    vectors: Vec<Vector>,
}

/// A vector attribute, e.g. one `DISK` or the `CONTEXT` section.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    name: String,
    pairs: Vec<(String, String)>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn cpu(&mut self, cpu: f64) -> &mut Self {
        self.add(keys::CPU, cpu)
    }

    pub fn vcpu(&mut self, vcpu: i32) -> &mut Self {
        self.add(keys::VCPU, vcpu)
    }

    pub fn memory(&mut self, memory_mb: i32) -> &mut Self {
        self.add(keys::MEMORY, memory_mb)
    }

    /// Append a new vector attribute. Repeated names (several `DISK`s) are allowed.
    pub fn add_vector(&mut self, name: &str) -> &mut Vector {
        self.vectors.push(Vector {
            name: name.to_string(),
            pairs: Vec::new(),
        });
        let last = self.vectors.len() - 1;
        &mut self.vectors[last]
    }

    /// The first vector with this name, created if absent.
    pub fn vector_mut(&mut self, name: &str) -> &mut Vector {
        match self.vectors.iter().position(|v| v.name == name) {
            Some(idx) => &mut self.vectors[idx],
            None => self.add_vector(name),
        }
    }

    pub fn vectors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Vector> + 'a {
        self.vectors.iter().filter(move |v| v.name == name)
    }

    pub fn add_disk(&mut self) -> &mut Vector {
        self.add_vector(keys::DISK)
    }

    pub fn add_nic(&mut self) -> &mut Vector {
        self.add_vector(keys::NIC)
    }

    pub fn add_graphics(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        self.vector_mut(keys::GRAPHICS).add(key, value);
        self
    }

    pub fn add_ctx(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        self.vector_mut(keys::CONTEXT).add(key, value);
        self
    }
}

impl Vector {
    pub fn add(&mut self, key: &str, value: impl fmt::Display) -> &mut Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// oned's template lexer only unescapes `\"` inside a quoted value, so any
/// other backslash must reach it untouched.
fn quote(value: &str) -> String {
    value.replace('"', "\\\"")
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.pairs {
            writeln!(f, "{key}=\"{}\"", quote(value))?;
        }
        for vector in &self.vectors {
            writeln!(f, "{vector}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=[", self.name)?;
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            let sep = if i + 1 == self.pairs.len() { " ]" } else { "," };
            write!(f, "\n  {key}=\"{}\"{sep}", quote(value))?;
        }
        if self.pairs.is_empty() {
            f.write_str(" ]")?;
        }
        Ok(())
    }
}
