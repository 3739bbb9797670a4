//! Bundler config and HTML entry templates.

/// Placeholder replaced with the entry module path.
pub const ENTRY_POINT_PLACEHOLDER: &str = "{{ENTRY_POINT}}";

/// Entry module referenced by the fallback page.
pub const DEFAULT_ENTRY_POINT: &str = "/src/main.jsx";

pub const VITE_REACT_CONFIG: &str = r#"
import { defineConfig } from 'vite';
import react from '@vitejs/plugin-react';

// https://vitejs.dev/config/
export default defineConfig({
  plugins: [react()],
  server: {
    host: true,
    hmr: {
      clientPort: 443,
    }
  }
});
"#;

pub const VITE_JS_CONFIG: &str = r#"
import { defineConfig } from 'vite';

// https://vitejs.dev/config/
export default defineConfig({
  server: {
    host: true,
    hmr: {
      clientPort: 443,
    }
  }
});
"#;

const REACT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>React App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="{{ENTRY_POINT}}"></script>
  </body>
</html>"#;

const JAVASCRIPT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>JavaScript App</title>
  </head>
  <body>
    <div id="app"></div>
    <script type="module" src="{{ENTRY_POINT}}"></script>
  </body>
</html>"#;

const FALLBACK_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Web Application</title>
  </head>
  <body>
    <div id="root"></div>
    <div id="app"></div>
    <!-- No entry point found. Common entry points are:
      - src/main.jsx, src/main.tsx, src/index.jsx, src/index.tsx
      - src/App.jsx, src/App.tsx, main.js, index.js
    -->
    <h1>No Entry Point Found</h1>
    <p>Please create one of the standard entry point files or update this HTML to point to your code.</p>
    <script type="module" src="{{ENTRY_POINT}}"></script>
  </body>
</html>"#;

/// Which HTML page to generate for an entry module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    React,
    JavaScript,
    Fallback,
}

impl TemplateKind {
    fn source(self) -> &'static str {
        match self {
            TemplateKind::React => REACT_HTML,
            TemplateKind::JavaScript => JAVASCRIPT_HTML,
            TemplateKind::Fallback => FALLBACK_HTML,
        }
    }

    /// Render the page with `entry_point` as the module script.
    pub fn render(self, entry_point: &str) -> String {
        self.source().replace(ENTRY_POINT_PLACEHOLDER, entry_point)
    }
}

/// A source file that can serve as the app's entry module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryCandidate {
    pub path: &'static str,
    pub kind: TemplateKind,
}

const fn candidate(path: &'static str, kind: TemplateKind) -> EntryCandidate {
    EntryCandidate { path, kind }
}

/// Entry modules in lookup order.
pub const ENTRY_CANDIDATES: &[EntryCandidate] = &[
    candidate("/src/main.jsx", TemplateKind::React),
    candidate("/src/main.tsx", TemplateKind::React),
    candidate("/src/index.jsx", TemplateKind::React),
    candidate("/src/index.tsx", TemplateKind::React),
    candidate("/src/App.jsx", TemplateKind::React),
    candidate("/src/App.tsx", TemplateKind::React),
    candidate("/main.jsx", TemplateKind::React),
    candidate("/main.tsx", TemplateKind::React),
    candidate("/index.jsx", TemplateKind::React),
    candidate("/index.tsx", TemplateKind::React),
    candidate("/src/main.js", TemplateKind::JavaScript),
    candidate("/src/index.js", TemplateKind::JavaScript),
    candidate("/main.js", TemplateKind::JavaScript),
    candidate("/index.js", TemplateKind::JavaScript),
];
