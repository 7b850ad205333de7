//! Syndrome decoding tables (C2): nearest-codeword lookup for the four
//! block codes coded BKW can sort samples by.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::step::CodingType;

/// Generator rows `[1, g2, ...]` for each supported `q`, chosen in the
/// original for minimal expected squared error (variance-optimal).
const G2_21: &[(u32, i64)] = &[(101, 30), (631, 73), (1601, 335), (2053, 175), (16411, 2584)];
const G_31: &[(u32, i64, i64)] = &[
    (101, 35, 13),
    (631, 205, 303),
    (1601, 8, 118),
    (2053, 14, 443),
    (16411, 3872, 7445),
];
const G_41: &[(u32, i64, i64, i64)] = &[
    (53, 20, 6, 44),
    (101, 69, 7, 91),
    (631, 126, 9, 332),
    (2053, 123, 456, 789),
];

fn generator_21(q: u32) -> Result<i64, ConfigError> {
    G2_21
        .iter()
        .find(|&&(g_q, _)| g_q == q)
        .map(|&(_, g2)| g2)
        .ok_or(ConfigError::UnsupportedModulus(q))
}

fn generator_31(q: u32) -> Result<(i64, i64), ConfigError> {
    G_31
        .iter()
        .find(|&&(g_q, _, _)| g_q == q)
        .map(|&(_, g2, g3)| (g2, g3))
        .ok_or(ConfigError::UnsupportedModulus(q))
}

fn generator_41(q: u32) -> Result<(i64, i64, i64), ConfigError> {
    G_41
        .iter()
        .find(|&&(g_q, _, _, _)| g_q == q)
        .map(|&(_, g2, g3, g4)| (g2, g3, g4))
        .ok_or(ConfigError::UnsupportedModulus(q))
}

fn syndrome_21(q: i64, g2: i64, a1: i64, a2: i64) -> i64 {
    ((q - g2) * a1 + a2).rem_euclid(q)
}

fn syndrome_31(q: i64, g2: i64, g3: i64, a1: i64, a2: i64, a3: i64) -> (i64, i64) {
    (((q - g2) * a1 + a2).rem_euclid(q), ((q - g3) * a1 + a3).rem_euclid(q))
}

fn syndrome_41(q: i64, g2: i64, g3: i64, g4: i64, a1: i64, a2: i64, a3: i64, a4: i64) -> (i64, i64, i64) {
    (
        ((q - g2) * a1 + a2).rem_euclid(q),
        ((q - g3) * a1 + a3).rem_euclid(q),
        ((q - g4) * a1 + a4).rem_euclid(q),
    )
}

fn half_distance(q: i64, e: i64) -> i64 {
    if e > q / 2 {
        q - e
    } else {
        e
    }
}

/// In-memory nearest-codeword table for one block code at a fixed `q`.
pub enum SyndromeTable {
    Block21 { q: u32, table: Vec<(i32, i32)> },
    Block31 { q: u32, table: Vec<(i32, i32, i32)> },
    Block41 { q: u32, table: Vec<(i32, i32, i32, i32)> },
}

impl SyndromeTable {
    pub fn q(&self) -> u32 {
        match self {
            SyndromeTable::Block21 { q, .. } => *q,
            SyndromeTable::Block31 { q, .. } => *q,
            SyndromeTable::Block41 { q, .. } => *q,
        }
    }

    /// Builds the `[2,1]` table by brute force over all `q^2` error pairs,
    /// keeping the minimum squared-distance representative per syndrome.
    pub fn generate_21(q: u32) -> Result<Self, ConfigError> {
        let g2 = generator_21(q)?;
        let qi = q as i64;
        let mut best_var = vec![-1i64; q as usize];
        let mut table = vec![(0i32, 0i32); q as usize];
        for e1 in 0..qi {
            for e2 in 0..qi {
                let syn = syndrome_21(qi, g2, e1, e2) as usize;
                let u = half_distance(qi, e1);
                let v = half_distance(qi, e2);
                let var = u * u + v * v;
                if best_var[syn] == -1 || var < best_var[syn] {
                    best_var[syn] = var;
                    table[syn] = (e1 as i32, e2 as i32);
                }
            }
        }
        Ok(SyndromeTable::Block21 { q, table })
    }

    /// Builds the `[3,1]` table by brute force over all `q^3` error triples.
    pub fn generate_31(q: u32) -> Result<Self, ConfigError> {
        let (g2, g3) = generator_31(q)?;
        let qi = q as i64;
        let num_syndromes = (q as usize) * (q as usize);
        let mut best_var = vec![-1i64; num_syndromes];
        let mut table = vec![(0i32, 0i32, 0i32); num_syndromes];
        for e1 in 0..qi {
            for e2 in 0..qi {
                for e3 in 0..qi {
                    let (s1, s2) = syndrome_31(qi, g2, g3, e1, e2, e3);
                    let syn = (qi * s2 + s1) as usize;
                    let u = half_distance(qi, e1);
                    let v = half_distance(qi, e2);
                    let w = half_distance(qi, e3);
                    let var = u * u + v * v + w * w;
                    if best_var[syn] == -1 || var < best_var[syn] {
                        best_var[syn] = var;
                        table[syn] = (e1 as i32, e2 as i32, e3 as i32);
                    }
                }
            }
        }
        Ok(SyndromeTable::Block31 { q, table })
    }

    /// Builds the `[4,1]` table. `max_component_error`, when `Some` and
    /// smaller than `q`, caps the brute-force search per component the way
    /// the original's `maxComponentError` parameter does for large `q`;
    /// any syndrome left without a representative is reported as an error
    /// rather than silently left unset.
    pub fn generate_41(q: u32, max_component_error: Option<u32>) -> Result<Self, ConfigError> {
        let (g2, g3, g4) = generator_41(q)?;
        let qi = q as i64;
        let max_loop = match max_component_error {
            Some(m) if m > 0 && (m as u32) < q => m as i64,
            _ => qi,
        };
        let num_syndromes = (q as usize).pow(3);
        let mut best_var = vec![-1i64; num_syndromes];
        let mut table = vec![(0i32, 0i32, 0i32, 0i32); num_syndromes];
        for e1 in 0..max_loop {
            for e2 in 0..max_loop {
                for e3 in 0..max_loop {
                    for e4 in 0..max_loop {
                        let (s1, s2, s3) = syndrome_41(qi, g2, g3, g4, e1, e2, e3, e4);
                        let syn = (s1 + qi * s2 + qi * qi * s3) as usize;
                        let u = half_distance(qi, e1);
                        let v = half_distance(qi, e2);
                        let w = half_distance(qi, e3);
                        let x = half_distance(qi, e4);
                        let var = u * u + v * v + w * w + x * x;
                        if best_var[syn] == -1 || var < best_var[syn] {
                            best_var[syn] = var;
                            table[syn] = (e1 as i32, e2 as i32, e3 as i32, e4 as i32);
                        }
                    }
                }
            }
        }
        if let Some(missing) = best_var.iter().position(|&v| v == -1) {
            return Err(ConfigError::RangeError(format!(
                "syndrome {} has no representative after capping component search at {}",
                missing, max_loop
            )));
        }
        Ok(SyndromeTable::Block41 { q, table })
    }

    pub fn generate(q: u32, coding: CodingType) -> Result<Self, ConfigError> {
        match coding {
            CodingType::Block21 | CodingType::Concatenated2121 => Self::generate_21(q),
            CodingType::Block31 => Self::generate_31(q),
            CodingType::Block41 => Self::generate_41(q, None),
        }
    }

    pub fn file_name(q: u32, coding: CodingType) -> String {
        let bl = match coding {
            CodingType::Block21 | CodingType::Concatenated2121 => 2,
            CodingType::Block31 => 3,
            CodingType::Block41 => 4,
        };
        format!("syndrome_decoding_table_{}1_{}.dat", bl, q)
    }

    pub fn load_or_generate(dir: &Path, q: u32, coding: CodingType) -> Result<Self, ConfigError> {
        let path = dir.join(Self::file_name(q, coding));
        if path.exists() {
            Self::load(&path, q, coding)
        } else {
            let table = Self::generate(q, coding)?;
            table.save(&path)?;
            Ok(table)
        }
    }

    pub fn load(path: &Path, q: u32, coding: CodingType) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)?;
        match coding {
            CodingType::Block21 | CodingType::Concatenated2121 => {
                let table = decode_entries(&bytes, q as usize, |c| (c[0], c[1]))?;
                Ok(SyndromeTable::Block21 { q, table })
            }
            CodingType::Block31 => {
                let table = decode_entries(&bytes, (q as usize) * (q as usize), |c| (c[0], c[1], c[2]))?;
                Ok(SyndromeTable::Block31 { q, table })
            }
            CodingType::Block41 => {
                let table = decode_entries(&bytes, (q as usize).pow(3), |c| (c[0], c[1], c[2], c[3]))?;
                Ok(SyndromeTable::Block41 { q, table })
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let bytes: Vec<u8> = match self {
            SyndromeTable::Block21 { table, .. } => table
                .iter()
                .flat_map(|&(a, b)| [a.to_le_bytes(), b.to_le_bytes()].concat())
                .collect(),
            SyndromeTable::Block31 { table, .. } => table
                .iter()
                .flat_map(|&(a, b, c)| [a.to_le_bytes(), b.to_le_bytes(), c.to_le_bytes()].concat())
                .collect(),
            SyndromeTable::Block41 { table, .. } => table
                .iter()
                .flat_map(|&(a, b, c, d)| {
                    [a.to_le_bytes(), b.to_le_bytes(), c.to_le_bytes(), d.to_le_bytes()].concat()
                })
                .collect(),
        };
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Decodes `pn` (the raw position values for this step) to the index
    /// of the nearest codeword's first component, as `position_values_2_
    /// category_index_coded_bkw` does; for the concatenated `[2,1]|[2,1]`
    /// code it combines two independent `[2,1]` decodes.
    pub fn nearest_codeword_category(&self, q: u32, pn: &[u32]) -> u64 {
        match self {
            SyndromeTable::Block21 { table, .. } => {
                if pn.len() == 4 {
                    let c1 = closest_codeword_21(table, q, pn[0], pn[1]).0;
                    let c3 = closest_codeword_21(table, q, pn[2], pn[3]).0;
                    c1 as u64 + q as u64 * c3 as u64
                } else {
                    closest_codeword_21(table, q, pn[0], pn[1]).0 as u64
                }
            }
            SyndromeTable::Block31 { table, .. } => closest_codeword_31(table, q, pn[0], pn[1], pn[2]).0 as u64,
            SyndromeTable::Block41 { table, .. } => {
                closest_codeword_41(table, q, pn[0], pn[1], pn[2], pn[3]).0 as u64
            }
        }
    }
}

fn decode_entries<T>(
    bytes: &[u8],
    count: usize,
    assemble: impl Fn(&[i32]) -> T,
) -> Result<Vec<T>, ConfigError> {
    let arity = bytes.len() / 4 / count.max(1);
    if count == 0 || bytes.len() != count * arity * 4 {
        return Err(ConfigError::MalformedDescriptor(
            "syndrome table file size does not match expected entry count".to_string(),
        ));
    }
    let mut out = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(arity * 4) {
        let components: Vec<i32> = chunk
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        out.push(assemble(&components));
    }
    Ok(out)
}

fn closest_codeword_21(table: &[(i32, i32)], q: u32, a1: u32, a2: u32) -> (u32, u32) {
    let g2 = generator_21(q).expect("generator looked up for an already-loaded table");
    let qi = q as i64;
    let syn = syndrome_21(qi, g2, a1 as i64, a2 as i64) as usize;
    let (e1, e2) = table[syn];
    let c1 = (a1 as i64 - e1 as i64).rem_euclid(qi) as u32;
    let c2 = (a2 as i64 - e2 as i64).rem_euclid(qi) as u32;
    (c1, c2)
}

fn closest_codeword_31(table: &[(i32, i32, i32)], q: u32, a1: u32, a2: u32, a3: u32) -> (u32, u32, u32) {
    let (g2, g3) = generator_31(q).expect("generator looked up for an already-loaded table");
    let qi = q as i64;
    let (s1, s2) = syndrome_31(qi, g2, g3, a1 as i64, a2 as i64, a3 as i64);
    let syn = (qi * s2 + s1) as usize;
    let (e1, e2, e3) = table[syn];
    (
        (a1 as i64 - e1 as i64).rem_euclid(qi) as u32,
        (a2 as i64 - e2 as i64).rem_euclid(qi) as u32,
        (a3 as i64 - e3 as i64).rem_euclid(qi) as u32,
    )
}

fn closest_codeword_41(
    table: &[(i32, i32, i32, i32)],
    q: u32,
    a1: u32,
    a2: u32,
    a3: u32,
    a4: u32,
) -> (u32, u32, u32, u32) {
    let (g2, g3, g4) = generator_41(q).expect("generator looked up for an already-loaded table");
    let qi = q as i64;
    let (s1, s2, s3) = syndrome_41(qi, g2, g3, g4, a1 as i64, a2 as i64, a3 as i64, a4 as i64);
    let syn = (s1 + qi * s2 + qi * qi * s3) as usize;
    let (e1, e2, e3, e4) = table[syn];
    (
        (a1 as i64 - e1 as i64).rem_euclid(qi) as u32,
        (a2 as i64 - e2 as i64).rem_euclid(qi) as u32,
        (a3 as i64 - e3 as i64).rem_euclid(qi) as u32,
        (a4 as i64 - e4 as i64).rem_euclid(qi) as u32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_21_covers_every_syndrome() {
        let table = SyndromeTable::generate_21(101).unwrap();
        if let SyndromeTable::Block21 { table, .. } = &table {
            assert_eq!(table.len(), 101);
        } else {
            panic!("wrong variant");
        }
    }

    #[test]
    fn closest_codeword_21_is_idempotent_on_a_codeword() {
        let table = SyndromeTable::generate_21(101).unwrap();
        // (1, g2) is a codeword by construction of the [2,1] code.
        let g2 = generator_21(101).unwrap() as u32;
        let cat = table.nearest_codeword_category(101, &[1, g2]);
        assert_eq!(cat, 0);
    }

    #[test]
    fn unsupported_modulus_errors() {
        assert!(generator_21(12345).is_err());
    }
}
