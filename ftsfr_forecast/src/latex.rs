//! Booktabs LaTeX tables

/// Escape LaTeX special characters
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}

/// Fixed-precision number, or `N/A`
pub fn number(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => "N/A".to_string(),
    }
}

#[derive(Debug, Clone)]
struct Section {
    title: Option<String>,
    rows: Vec<Vec<String>>,
}

/// A table with optional titled row groups
#[derive(Debug, Clone)]
pub struct LatexTable {
    caption: String,
    label: String,
    align: String,
    header: Vec<String>,
    sections: Vec<Section>,
}

impl LatexTable {
    /// `align` is a tabular column spec such as `lrrr`
    pub fn new(caption: &str, label: &str, align: &str, header: &[&str]) -> Self {
        Self {
            caption: caption.to_string(),
            label: label.to_string(),
            align: align.to_string(),
            header: header.iter().map(|h| escape(h)).collect(),
            sections: Vec::new(),
        }
    }

    /// Append a row group; cells are written verbatim
    pub fn section(&mut self, title: Option<&str>, rows: Vec<Vec<String>>) -> &mut Self {
        self.sections.push(Section {
            title: title.map(escape),
            rows,
        });
        self
    }

    pub fn render(&self) -> String {
        let width = self.header.len();
        let mut out = String::new();
        out.push_str("\\begin{table}[htbp]\n\\centering\n");
        out.push_str(&format!("\\caption{{{}}}\n", escape(&self.caption)));
        out.push_str(&format!("\\label{{{}}}\n", self.label));
        out.push_str(&format!("\\begin{{tabular}}{{{}}}\n\\toprule\n", self.align));
        out.push_str(&format!("{} \\\\\n\\midrule\n", self.header.join(" & ")));
        for (i, section) in self.sections.iter().enumerate() {
            if let Some(title) = &section.title {
                if i > 0 {
                    out.push_str("\\midrule\n");
                }
                out.push_str(&format!(
                    "\\multicolumn{{{}}}{{l}}{{\\textit{{{}}}}} \\\\\n",
                    width, title
                ));
            }
            for row in &section.rows {
                out.push_str(&format!("{} \\\\\n", row.join(" & ")));
            }
        }
        out.push_str("\\bottomrule\n\\end{tabular}\n\\end{table}\n");
        out
    }
}
