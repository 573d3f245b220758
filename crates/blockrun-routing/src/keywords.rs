//! Compiled-in keyword lists for the rule classifier
//!
//! Lists are multilingual (English, Chinese, Japanese, Russian, German,
//! Spanish, Portuguese, Korean, Arabic) and matched by case-insensitive
//! substring containment on the lowercased text; order within a list is
//! irrelevant.

use indexmap::IndexMap;

/// All keyword lists used by the classifier dimensions
#[derive(Debug, Clone)]
pub struct KeywordSets {
    pub code: Vec<String>,
    pub reasoning: Vec<String>,
    pub technical: Vec<String>,
    pub creative: Vec<String>,
    pub simple: Vec<String>,
    pub imperative: Vec<String>,
    pub constraint: Vec<String>,
    pub output_format: Vec<String>,
    pub reference: Vec<String>,
    pub negation: Vec<String>,
    pub domain: Vec<String>,
    pub agentic: Vec<String>,
}

impl KeywordSets {
    /// Replace individual lists from config overrides, keyed by dimension name
    pub fn apply_overrides(&mut self, overrides: &IndexMap<String, Vec<String>>) {
        for (name, list) in overrides {
            let lowered: Vec<String> = list.iter().map(|k| k.to_lowercase()).collect();
            match name.as_str() {
                "code" => self.code = lowered,
                "reasoning" => self.reasoning = lowered,
                "technical" => self.technical = lowered,
                "creative" => self.creative = lowered,
                "simple" => self.simple = lowered,
                "imperative" => self.imperative = lowered,
                "constraint" => self.constraint = lowered,
                "output_format" => self.output_format = lowered,
                "reference" => self.reference = lowered,
                "negation" => self.negation = lowered,
                "domain" => self.domain = lowered,
                "agentic" => self.agentic = lowered,
                other => tracing::warn!(dimension = other, "ignoring keyword override for unknown dimension"),
            }
        }
    }
}

/// Count keyword hits in already-lowercased text
///
/// Returns the hit count and the matched keywords (for signal strings).
pub fn match_count<'a>(lowered: &str, list: &'a [String]) -> (usize, Vec<&'a str>) {
    let mut matched = Vec::new();
    for keyword in list {
        if lowered.contains(keyword.as_str()) {
            matched.push(keyword.as_str());
        }
    }
    (matched.len(), matched)
}

fn list(words: &[&str]) -> Vec<String> {
    words.iter().map(|&w| w.to_owned()).collect()
}

impl Default for KeywordSets {
    #[allow(clippy::too_many_lines)]
    fn default() -> Self {
        Self {
            code: list(&[
                "function", "class ", "def ", "import ", "```", "compile", "debug", "stack trace", "algorithm",
                "refactor", "unit test", "代码", "函数", "算法", "コード", "関数", "код", "функци", "алгоритм",
                "quellcode", "funktion", "código", "función", "algoritmo", "função", "코드", "함수", "알고리즘",
                "شيفرة", "برمجة", "دالة",
            ]),
            reasoning: list(&[
                "step by step", "step-by-step", "prove", "derive", "reason through", "think through", "chain of thought",
                "show your work", "逐步", "证明", "推理", "推导", "ステップバイステップ", "証明", "推論", "докажи",
                "шаг за шагом", "рассуждени", "выведи", "beweise", "schritt für schritt", "herleite", "paso a paso",
                "demuestra", "razonamiento", "passo a passo", "demonstre", "raciocínio", "단계별", "증명", "추론",
                "أثبت", "خطوة بخطوة", "استنتاج",
            ]),
            technical: list(&[
                "kubernetes", "microservice", "database", "compiler", "concurrency", "distributed", "encryption",
                "protocol", "latency", "throughput", "idempotent", "consensus", "数据库", "并发", "分布式", "加密",
                "データベース", "並行処理", "分散システム", "база данных", "параллелизм", "распределённ", "шифрование",
                "datenbank", "nebenläufigkeit", "verschlüsselung", "base de datos", "concurrencia", "cifrado",
                "banco de dados", "concorrência", "criptografia", "데이터베이스", "동시성", "암호화", "قاعدة بيانات",
                "تشفير", "موزع",
            ]),
            creative: list(&[
                "story", "poem", "fiction", "creative writing", "narrative", "screenplay", "lyrics", "故事", "诗歌",
                "小说", "物語", "詩", "脚本", "рассказ", "стихотворени", "сценарий", "geschichte", "gedicht",
                "drehbuch", "historia", "poema", "guion", "história", "conto", "roteiro", "이야기", "시를", "소설",
                "قصة", "قصيدة", "سيناريو",
            ]),
            simple: list(&[
                "what is", "what are", "who is", "who was", "when did", "where is", "how many", "define ",
                "translate", "capital of", "什么是", "谁是", "在哪里", "とは何", "誰です", "どこに", "что такое",
                "кто такой", "где находится", "was ist", "wer ist", "wo liegt", "qué es", "quién es", "dónde está",
                "o que é", "quem é", "onde fica", "무엇인가", "누구인가", "어디에", "ما هو", "من هو", "أين",
            ]),
            imperative: list(&[
                "implement", "build", "create", "design", "develop", "refactor", "optimize", "migrate", "实现",
                "构建", "设计", "実装", "構築", "設計", "реализуй", "создай", "спроектируй", "implementiere",
                "erstelle", "entwirf", "implementa", "crea", "diseña", "implemente", "crie", "projete", "구현",
                "만들어", "설계", "نفذ", "أنشئ", "صمم",
            ]),
            constraint: list(&[
                "must", "should not", "at most", "at least", "no more than", "without using", "limit", "constraint",
                "required to", "必须", "不得", "最多", "至少", "しなければ", "以内", "以上", "должен", "не более",
                "не менее", "muss", "höchstens", "mindestens", "debe", "como máximo", "al menos", "deve",
                "no máximo", "pelo menos", "반드시", "이내", "이상", "يجب", "على الأكثر", "على الأقل",
            ]),
            output_format: list(&[
                "json", "yaml", "xml", "csv", "markdown", "table", "bullet points", "schema", "表格", "表形式",
                "таблица", "таблице", "tabelle", "tabla", "tabela", "표로", "목록으로", "جدول", "قائمة",
            ]),
            reference: list(&[
                "the above", "previous message", "as mentioned", "refer to", "earlier response", "aforementioned",
                "上面", "前面提到", "上記", "前述", "выше", "ранее", "упомянут", "oben genannt", "wie erwähnt",
                "lo anterior", "mencionado", "acima", "conforme mencionado", "위에서", "앞서 언급", "المذكور أعلاه",
                "سابقا",
            ]),
            negation: list(&[
                "do not", "don't", "never", "avoid", "except", "without", "exclude", "不要", "不能", "除了",
                "しないで", "せずに", "не надо", "нельзя", "кроме", "nicht", "niemals", "außer", "no uses",
                "nunca", "excepto", "não", "evite", "exceto", "하지 마", "않고", "제외", "لا تستخدم", "بدون",
                "باستثناء",
            ]),
            domain: list(&[
                "quantum", "zero-knowledge", "homomorphic", "lattice-based", "genomics", "relativity", "topology",
                "bayesian", "stochastic", "量子", "零知识", "同态", "ゼロ知識", "量子力学", "квантов",
                "гомоморфн", "quanten", "nullwissen", "cuántic", "conocimiento cero", "quântic",
                "conhecimento zero", "양자", "영지식", "كمومي", "معرفة صفرية",
            ]),
            agentic: list(&[
                "use the tool", "call the api", "browse", "search the web", "execute", "run the command",
                "file system", "terminal", "workflow", "multi-step task", "autonomous", "agent", "调用工具",
                "执行命令", "浏览网页", "ツールを使", "実行して", "コマンドを", "вызови инструмент",
                "выполни команду", "verwende das tool", "führe aus", "usa la herramienta", "ejecuta el comando",
                "use a ferramenta", "execute o comando", "도구를 사용", "명령을 실행", "استخدم الأداة", "نفذ الأمر",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_count_is_order_independent() {
        let mut sets = KeywordSets::default();
        let (before, _) = match_count("write a function with an algorithm", &sets.code);
        sets.code.reverse();
        let (after, _) = match_count("write a function with an algorithm", &sets.code);
        assert_eq!(before, after);
        assert_eq!(before, 2);
    }

    #[test]
    fn matches_multilingual() {
        let sets = KeywordSets::default();
        assert_eq!(match_count("帮我写一个函数", &sets.code).0, 1);
        assert_eq!(match_count("докажи шаг за шагом", &sets.reasoning).0, 2);
        assert_eq!(match_count("استخدم الأداة من فضلك", &sets.agentic).0, 1);
    }

    #[test]
    fn overrides_replace_lists() {
        let mut sets = KeywordSets::default();
        let mut overrides = IndexMap::new();
        overrides.insert("code".to_owned(), vec!["BANANA".to_owned()]);
        sets.apply_overrides(&overrides);
        assert_eq!(sets.code, vec!["banana".to_owned()]);
        // Untouched lists keep their defaults
        assert!(!sets.reasoning.is_empty());
    }
}
