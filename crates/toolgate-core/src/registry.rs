use std::collections::HashMap;

use crate::error::Error;
use crate::traits::SharedTool;

/// A named collection of tools with unique names, exposed as one unit.
#[derive(Clone)]
pub struct Toolset {
    name: String,
    description: String,
    tools: Vec<SharedTool>,
    lookup: HashMap<String, usize>,
}

impl Toolset {
    /// Build a toolset. Duplicate tool names are resolved by the later
    /// tool replacing the earlier one in place.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tools: impl IntoIterator<Item = SharedTool>,
    ) -> Self {
        let mut toolset = Self {
            name: name.into(),
            description: description.into(),
            tools: Vec::new(),
            lookup: HashMap::new(),
        };
        for tool in tools {
            toolset.register_tool(tool);
        }
        toolset
    }

    /// Add a tool. Returns `true` if it replaced a tool of the same name.
    pub fn register_tool(&mut self, tool: SharedTool) -> bool {
        let tool_name = tool.name().to_string();
        if let Some(&index) = self.lookup.get(&tool_name) {
            tracing::warn!(tool = %tool_name, toolset = %self.name, "Overwriting tool in toolset");
            self.tools[index] = tool;
            true
        } else {
            self.lookup.insert(tool_name, self.tools.len());
            self.tools.push(tool);
            false
        }
    }

    /// Look up a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if no tool has that name.
    pub fn get_tool(&self, tool_name: &str) -> Result<&SharedTool, Error> {
        self.lookup
            .get(tool_name)
            .map(|&index| &self.tools[index])
            .ok_or_else(|| Error::ToolNotFound(format!("{tool_name} (toolset {})", self.name)))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn tools(&self) -> &[SharedTool] {
        &self.tools
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for Toolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        f.debug_struct("Toolset")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tools", &names)
            .finish()
    }
}

struct RegisteredTool {
    toolset: String,
    tool: SharedTool,
}

/// Aggregates toolsets and resolves tools by name across all of them.
///
/// Tool names are global within a registry: when two toolsets publish the
/// same tool name, the last registration wins and the overwrite is logged
/// and reported back from [`ToolsetRegistry::register`].
#[derive(Default)]
pub struct ToolsetRegistry {
    toolsets: HashMap<String, Toolset>,
    tools: HashMap<String, RegisteredTool>,
    /// Tool names in first-registration order.
    order: Vec<String>,
}

impl ToolsetRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every toolset in order.
    pub fn with_toolsets(toolsets: impl IntoIterator<Item = Toolset>) -> Self {
        let mut registry = Self::new();
        for toolset in toolsets {
            registry.register(toolset);
        }
        registry
    }

    /// Register a toolset and all of its tools.
    ///
    /// Returns the names of tools that replaced a previously registered
    /// tool from another (or the same) toolset.
    pub fn register(&mut self, toolset: Toolset) -> Vec<String> {
        let mut overridden = Vec::new();

        for tool in toolset.tools() {
            let tool_name = tool.name().to_string();
            let entry = RegisteredTool {
                toolset: toolset.name().to_string(),
                tool: SharedTool::clone(tool),
            };
            if let Some(previous) = self.tools.insert(tool_name.clone(), entry) {
                tracing::warn!(
                    tool = %tool_name,
                    previous_toolset = %previous.toolset,
                    toolset = %toolset.name(),
                    "Tool name collision, replaced by later toolset"
                );
                overridden.push(tool_name);
            } else {
                self.order.push(tool_name);
            }
        }

        if self.toolsets.contains_key(toolset.name()) {
            tracing::warn!(toolset = %toolset.name(), "Overwriting toolset");
        }
        tracing::info!(
            toolset = %toolset.name(),
            tools = toolset.len(),
            "Registered toolset"
        );
        self.toolsets.insert(toolset.name().to_string(), toolset);

        overridden
    }

    /// Look up a tool by name across all registered toolsets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if no registered toolset has it.
    pub fn find_tool(&self, tool_name: &str) -> Result<SharedTool, Error> {
        self.tools
            .get(tool_name)
            .map(|registered| SharedTool::clone(&registered.tool))
            .ok_or_else(|| Error::ToolNotFound(tool_name.to_string()))
    }

    /// Name of the toolset currently owning `tool_name`.
    #[must_use]
    pub fn owner_of(&self, tool_name: &str) -> Option<&str> {
        self.tools.get(tool_name).map(|r| r.toolset.as_str())
    }

    /// Look up a toolset by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolsetNotFound`] if it was never registered.
    pub fn get_toolset(&self, name: &str) -> Result<&Toolset, Error> {
        self.toolsets
            .get(name)
            .ok_or_else(|| Error::ToolsetNotFound(name.to_string()))
    }

    /// Every registered tool, deduplicated by name, in the order names were
    /// first registered.
    #[must_use]
    pub fn all_tools(&self) -> Vec<SharedTool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|registered| SharedTool::clone(&registered.tool))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
