use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::ConfigError;

/// Vocabulary written to words.json on first run.
pub const DEFAULT_WORDS: &[&str] = &[
    // Basics
    "Empreender", "Negócio", "Empresa", "Liderança", "Objetivo",
    "Sucesso", "Crescimento", "Iniciativa", "Autonomia", "Desafio",
    // Finance
    "Dinheiro", "Lucro", "Investidor", "Preço", "Orçamento",
    "Custo", "Capital", "Receita", "Rentável", "Economia",
    // Management
    "Meta", "Resultados", "Organização", "Equipe", "Projeto",
    "Estratégia", "Planejamento", "Controle", "Execução", "Tomada de decisão",
    // Marketing and sales
    "Marca", "Cliente", "Promoção", "Divulgação", "Propaganda",
    "Atratividade", "Persuasão", "Destaque", "Mercado", "Concorrência",
    // Methods
    "Aprendizado", "Experiência", "Testes", "Eficiência", "Produtividade",
    "Simplificação", "Criatividade", "Desenvolvimento", "Solução", "Dinamismo",
    // Ecosystem
    "Parceria", "Mentoria", "Networking", "Oportunidade", "Conexão",
    "Relacionamento", "Colaboração", "Suporte", "Comunidade", "Referência",
    // Innovation
    "Tecnologia", "Tendência", "Digitalização", "Automação", "Transformação",
    "Originalidade", "Descoberta", "Adaptação", "Progresso", "Mudança",
    // Soft skills
    "Persistência", "Determinação", "Autoconfiança", "Foco", "Resiliência",
    "Paciência", "Motivação", "Curiosidade", "Flexibilidade", "Empatia",
    // Paperwork
    "Contrato", "Planejamento", "Proposta", "Apresentação", "Relatório",
    "Registro", "Visão", "Missão", "Formalização", "Análise",
];

/// The shared vocabulary every round is drawn from.
///
/// Entries are trimmed and deduplicated on construction, so any partition
/// of the pool hands out distinct words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordPool {
    words: Vec<String>,
}

impl WordPool {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| !w.is_empty())
            .filter(|w| seen.insert(w.clone()))
            .collect();
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Checks the pool can fill two lists of `per_team` words.
    pub fn ensure_fits(&self, per_team: usize) -> Result<(), ConfigError> {
        let required = per_team * 2;
        if per_team == 0 || self.words.len() < required {
            return Err(ConfigError::PoolTooSmall {
                available: self.words.len(),
                required: required.max(2),
            });
        }
        Ok(())
    }

    /// Shuffles the whole pool and deals two disjoint lists of `per_team` words.
    pub fn partition<R: Rng + ?Sized>(&self, per_team: usize, rng: &mut R) -> [Vec<String>; 2] {
        let mut shuffled = self.words.clone();
        shuffled.shuffle(rng);
        shuffled.truncate(per_team * 2);
        let second = shuffled.split_off(shuffled.len().min(per_team));
        [shuffled, second]
    }
}

impl Default for WordPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS)
    }
}
