//! Упорядочивание по ограничениям precedes/follows
//!
//! Топологическая сортировка (алгоритм Кана); среди готовых узлов первым
//! берётся объявленный раньше. `*` означает "все остальные", кроме тех,
//! кто сам заявил `*` в том же направлении.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::errors::{ErrorLog, HiveError, Location};

struct OrderEntry<T> {
    name: String,
    object: T,
    preceding: Vec<String>,
    following: Vec<String>,
    location: Option<Location>,
}

/// Сортирует объекты по именам и ограничениям порядка
pub struct Orderer<T> {
    owner: String,
    entries: Vec<OrderEntry<T>>,
}

impl<T> Orderer<T> {
    /// `owner` используется в сообщениях (обычно id точки сервиса)
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Добавить объект; повторное имя - ошибка конфигурации
    pub fn add(
        &mut self,
        object: T,
        name: impl Into<String>,
        preceding: &[String],
        following: &[String],
        location: Option<Location>,
    ) -> Result<(), HiveError> {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(HiveError::configuration(
                format!("'{}' is contributed more than once to {}", name, self.owner),
                location,
            ));
        }
        self.entries.push(OrderEntry {
            name,
            object,
            preceding: preceding.to_vec(),
            following: following.to_vec(),
            location,
        });
        Ok(())
    }

    /// Отсортировать; неизвестные имена сообщаются в ErrorLog и игнорируются
    pub fn into_ordered(self, error_log: &ErrorLog) -> Result<Vec<T>, HiveError> {
        let count = self.entries.len();
        let index: HashMap<&str, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.as_str(), i))
            .collect();

        let precede_all: Vec<bool> = self.entries.iter().map(|e| e.preceding.iter().any(|n| n == "*")).collect();
        let follow_all: Vec<bool> = self.entries.iter().map(|e| e.following.iter().any(|n| n == "*")).collect();

        // edges[a] содержит b: a должен идти раньше b
        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];

        for (i, entry) in self.entries.iter().enumerate() {
            for name in entry.preceding.iter().filter(|n| n.as_str() != "*") {
                match index.get(name.as_str()) {
                    Some(&j) if j != i => {
                        edges[i].insert(j);
                    }
                    Some(_) => {}
                    None => self.report_unknown(error_log, entry, name)?,
                }
            }
            for name in entry.following.iter().filter(|n| n.as_str() != "*") {
                match index.get(name.as_str()) {
                    Some(&j) if j != i => {
                        edges[j].insert(i);
                    }
                    Some(_) => {}
                    None => self.report_unknown(error_log, entry, name)?,
                }
            }
        }

        for i in 0..count {
            for j in 0..count {
                if i == j {
                    continue;
                }
                if precede_all[i] && !precede_all[j] {
                    edges[i].insert(j);
                }
                if follow_all[i] && !follow_all[j] {
                    edges[j].insert(i);
                }
            }
        }

        let mut in_degree = vec![0usize; count];
        for targets in &edges {
            for &j in targets {
                in_degree[j] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &j in &edges[next] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() < count {
            let cycle = self.describe_cycle(&edges, &in_degree);
            return Err(HiveError::InterceptorCycle {
                service_id: self.owner,
                cycle,
            });
        }

        debug!(
            "🔗 Порядок для {}: {}",
            self.owner,
            order
                .iter()
                .map(|&i| self.entries[i].name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut slots: Vec<Option<T>> = self.entries.into_iter().map(|e| Some(e.object)).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    fn report_unknown(&self, error_log: &ErrorLog, entry: &OrderEntry<T>, name: &str) -> Result<(), HiveError> {
        error_log.error(
            &format!(
                "Unknown name '{}' in ordering constraints of '{}' for {}",
                name, entry.name, self.owner
            ),
            entry.location.as_ref(),
            None,
        )
    }

    /// Найти цикл среди неотсортированных узлов, двигаясь по предшественникам
    fn describe_cycle(&self, edges: &[BTreeSet<usize>], in_degree: &[usize]) -> String {
        let remaining: Vec<usize> = (0..in_degree.len()).filter(|&i| in_degree[i] > 0).collect();
        let predecessor = |node: usize| {
            remaining
                .iter()
                .copied()
                .find(|&p| edges[p].contains(&node))
        };

        let mut path: Vec<usize> = Vec::new();
        let mut current = remaining.first().copied();
        while let Some(node) = current {
            if let Some(start) = path.iter().position(|&n| n == node) {
                // path идёт против направления рёбер
                let mut cycle = vec![self.entries[node].name.as_str()];
                cycle.extend(path[start + 1..].iter().rev().map(|&i| self.entries[i].name.as_str()));
                cycle.push(self.entries[node].name.as_str());
                return cycle.join(" -> ");
            }
            path.push(node);
            current = predecessor(node);
        }

        remaining
            .iter()
            .map(|&i| self.entries[i].name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
