//! A DIMACS CNF base-feature extractor: clause/variable counts, a
//! clause-size histogram, Horn-clause statistics, and positive/negative
//! literal balance statistics, computed from the raw literal stream rather
//! than any deeper structural model (variable-incidence graph, etc.).

use std::io::{BufRead, Read};

use gbd_core::{Extract, ExtractError, FeatureMap};

/// Summary statistics (mean, variance, min, max) over a distribution of
/// `f64` samples, reduced down into four feature values by the caller.
struct Summary {
    mean: f64,
    variance: f64,
    min: f64,
    max: f64,
}

impl Summary {
    fn of(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Summary { mean: 0.0, variance: 0.0, min: 0.0, max: 0.0 };
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Summary { mean, variance, min, max }
    }

    fn insert(&self, out: &mut FeatureMap, prefix: &str) {
        out.insert(format!("{prefix}_mean"), self.mean.into());
        out.insert(format!("{prefix}_variance"), self.variance.into());
        out.insert(format!("{prefix}_min"), self.min.into());
        out.insert(format!("{prefix}_max"), self.max.into());
    }
}

/// Disjoint-set union over 1-based variable indices, used to count
/// connected components (variables linked by appearing together in a
/// clause).
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..=n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }

    fn component_count(&mut self, vars: impl Iterator<Item = usize>) -> usize {
        let mut roots = std::collections::HashSet::new();
        for v in vars {
            roots.insert(self.find(v));
        }
        roots.len()
    }
}

struct ParsedCnf {
    n_vars: usize,
    clauses: Vec<Vec<i64>>,
    bytes: usize,
}

fn parse(mut input: impl Read) -> Result<ParsedCnf, ExtractError> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let bytes = raw.len();

    let mut n_vars = 0usize;
    let mut clauses = Vec::new();
    let mut current = Vec::new();

    for line in raw.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        if let Some(header) = line.strip_prefix("p cnf") {
            let mut parts = header.split_whitespace();
            n_vars = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ExtractError::Malformed("bad p cnf header".to_string()))?;
            continue;
        }
        for tok in line.split_whitespace() {
            let lit: i64 = tok
                .parse()
                .map_err(|_| ExtractError::Malformed(format!("bad literal: {tok:?}")))?;
            if lit == 0 {
                clauses.push(std::mem::take(&mut current));
            } else {
                current.push(lit);
            }
        }
    }
    if !current.is_empty() {
        clauses.push(current);
    }

    Ok(ParsedCnf { n_vars, clauses, bytes })
}

/// Computes the base-feature family over a DIMACS CNF byte stream.
pub struct BaseFeatures<R> {
    source: Option<R>,
}

impl<R: Read> BaseFeatures<R> {
    /// Build an extractor that will read `source` on `extract()`.
    pub fn new(source: R) -> Self {
        Self { source: Some(source) }
    }
}

impl<R: Read + Send> Extract for BaseFeatures<R> {
    fn extract(&mut self) -> Result<FeatureMap, ExtractError> {
        let source = self
            .source
            .take()
            .ok_or_else(|| ExtractError::Malformed("extractor already consumed".to_string()))?;
        let parsed = parse(source)?;
        Ok(compute(&parsed))
    }
}

fn compute(cnf: &ParsedCnf) -> FeatureMap {
    let mut out = FeatureMap::new();
    let n_vars = cnf.n_vars;
    let n_clauses = cnf.clauses.len();

    out.insert("clauses".to_string(), (n_clauses as u64).into());
    out.insert("variables".to_string(), (n_vars as u64).into());
    out.insert("bytes".to_string(), (cnf.bytes as u64).into());

    let mut clause_sizes = [0u64; 11];
    let mut horn = 0u64;
    let mut inv_horn = 0u64;
    let mut positive = 0u64;
    let mut negative = 0u64;

    let mut variable_horn = vec![0u32; n_vars + 1];
    let mut variable_inv_horn = vec![0u32; n_vars + 1];
    let mut pos_occ = vec![0u32; n_vars + 1];
    let mut neg_occ = vec![0u32; n_vars + 1];
    let mut balance_clause = Vec::with_capacity(n_clauses);

    let mut uf = UnionFind::new(n_vars);

    for clause in &cnf.clauses {
        let size = clause.len();
        let bucket = size.min(10);
        clause_sizes[bucket] += 1;

        let pos = clause.iter().filter(|l| **l > 0).count();
        let neg = size - pos;

        if pos <= 1 {
            horn += 1;
        }
        if neg <= 1 {
            inv_horn += 1;
        }
        if neg == 0 && size > 0 {
            positive += 1;
        }
        if pos == 0 && size > 0 {
            negative += 1;
        }

        if size > 0 {
            let total = (pos + neg) as f64;
            balance_clause.push((pos as f64 - neg as f64) / total);
        }

        for &lit in clause {
            let v = lit.unsigned_abs() as usize;
            if lit > 0 {
                pos_occ[v] += 1;
            } else {
                neg_occ[v] += 1;
            }
            if pos <= 1 {
                variable_horn[v] += 1;
            }
            if neg <= 1 {
                variable_inv_horn[v] += 1;
            }
        }

        let mut first = None;
        for &lit in clause {
            let v = lit.unsigned_abs() as usize;
            match first {
                None => first = Some(v),
                Some(f) => uf.union(f, v),
            }
        }
    }

    for (i, count) in clause_sizes.iter().enumerate() {
        let key = if i < 10 {
            format!("cls{}", i + 1)
        } else {
            "cls10p".to_string()
        };
        out.insert(key, (*count).into());
    }

    out.insert("horn".to_string(), horn.into());
    out.insert("invhorn".to_string(), inv_horn.into());
    out.insert("positive".to_string(), positive.into());
    out.insert("negative".to_string(), negative.into());

    let ccs = uf.component_count(1..=n_vars);
    out.insert("ccs".to_string(), (ccs as u64).into());

    let hornvars: Vec<f64> = variable_horn[1..].iter().map(|c| *c as f64).collect();
    let invhornvars: Vec<f64> = variable_inv_horn[1..].iter().map(|c| *c as f64).collect();
    let balance_variable: Vec<f64> = (1..=n_vars)
        .filter_map(|v| {
            let total = pos_occ[v] + neg_occ[v];
            if total == 0 {
                None
            } else {
                Some((pos_occ[v] as f64 - neg_occ[v] as f64) / total as f64)
            }
        })
        .collect();

    Summary::of(&hornvars).insert(&mut out, "hornvars");
    Summary::of(&invhornvars).insert(&mut out, "invhornvars");
    Summary::of(&balance_clause).insert(&mut out, "balancecls");
    Summary::of(&balance_variable).insert(&mut out, "balancevars");

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cnf(text: &str) -> ParsedCnf {
        parse(text.as_bytes()).expect("valid cnf")
    }

    #[test]
    fn parses_header_and_clauses() {
        let parsed = cnf("c a comment\np cnf 3 2\n1 -2 0\n2 3 0\n");
        assert_eq!(parsed.n_vars, 3);
        assert_eq!(parsed.clauses, vec![vec![1, -2], vec![2, 3]]);
    }

    #[test]
    fn horn_clauses_have_at_most_one_positive_literal() {
        let parsed = cnf("p cnf 3 2\n-1 -2 3 0\n-1 -2 -3 0\n");
        let features = compute(&parsed);
        assert_eq!(features["horn"], (2u64).into());
    }

    #[test]
    fn connected_components_split_disjoint_clauses() {
        let parsed = cnf("p cnf 4 2\n1 2 0\n3 4 0\n");
        let features = compute(&parsed);
        assert_eq!(features["ccs"], (2u64).into());
    }

    #[test]
    fn extract_consumes_source_once() {
        let mut extractor = BaseFeatures::new("p cnf 1 1\n1 0\n".as_bytes());
        assert!(extractor.extract().is_ok());
        assert!(extractor.extract().is_err());
    }
}
